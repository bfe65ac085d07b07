//! 保存形式の差異を吸収するメタデータ修復
//!
//! 別バージョンのシリアライザで書かれた `metadata.json` は、
//! 厳格なパーサでは読めないが中身は同じ、ということがあります。
//! ここではJSONツリー全体を再帰的にたどり、既知の差異を直したコピーを返します。
//! 元のツリーは変更しません。
//!
//! 修復内容は [`CompatRules`] として設定ファイルから変更できます。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// キー名の置き換え
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRename {
    pub from: String,
    pub to: String,
}

impl KeyRename {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// 修復ルール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatRules {
    /// 入力形状などのキー名変更
    #[serde(default)]
    pub renames: Vec<KeyRename>,
    /// 削除するキー（`optional`, `quantization_config` など）
    #[serde(default)]
    pub strip_keys: Vec<String>,
    /// dtypeポリシーのオブジェクトを名前文字列に畳むキー
    #[serde(default)]
    pub collapse_policy_keys: Vec<String>,
}

impl Default for CompatRules {
    fn default() -> Self {
        Self {
            renames: vec![KeyRename::new("batch_shape", "batch_input_shape")],
            strip_keys: vec!["optional".to_string(), "quantization_config".to_string()],
            collapse_policy_keys: vec!["dtype".to_string()],
        }
    }
}

/// 修復で行った変更の件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub renamed: usize,
    pub stripped: usize,
    pub collapsed: usize,
}

impl RepairReport {
    pub fn total(&self) -> usize {
        self.renamed + self.stripped + self.collapsed
    }
}

impl CompatRules {
    /// 修復なし
    pub fn none() -> Self {
        Self {
            renames: Vec::new(),
            strip_keys: Vec::new(),
            collapse_policy_keys: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
            && self.strip_keys.is_empty()
            && self.collapse_policy_keys.is_empty()
    }

    /// 修復したコピーを返す
    pub fn repair(&self, value: &Value) -> Value {
        self.repair_with_report(value).0
    }

    /// 修復したコピーと変更件数を返す
    pub fn repair_with_report(&self, value: &Value) -> (Value, RepairReport) {
        let mut report = RepairReport::default();
        let repaired = self.repair_value(value, &mut report);
        (repaired, report)
    }

    fn repair_value(&self, value: &Value, report: &mut RepairReport) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.repair_object(map, report)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.repair_value(item, report))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn repair_object(
        &self,
        map: &Map<String, Value>,
        report: &mut RepairReport,
    ) -> Map<String, Value> {
        let mut out = Map::new();
        let mut renamed = Vec::new();

        for (key, child) in map {
            if self.strip_keys.iter().any(|k| k == key) {
                report.stripped += 1;
                continue;
            }
            match self.renames.iter().find(|r| &r.from == key) {
                Some(rename) => renamed.push((rename.to.clone(), child)),
                None => {
                    let repaired = self.repair_child(key, child, report);
                    out.insert(key.clone(), repaired);
                }
            }
        }

        // 新旧両方のキーがある場合は新しいキーの値を優先
        for (key, child) in renamed {
            report.renamed += 1;
            if !out.contains_key(&key) {
                let repaired = self.repair_child(&key, child, report);
                out.insert(key, repaired);
            }
        }
        out
    }

    fn repair_child(&self, key: &str, child: &Value, report: &mut RepairReport) -> Value {
        if self.collapse_policy_keys.iter().any(|k| k == key) {
            if let Some(name) = policy_name(child) {
                report.collapsed += 1;
                return Value::String(name);
            }
        }
        self.repair_value(child, report)
    }
}

/// `{"class_name": "DTypePolicy", "config": {"name": "float32"}}` や
/// `{"name": "float32"}` から名前を取り出す
fn policy_name(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    obj.get("config")
        .and_then(|config| config.get("name"))
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::drifted_metadata_value;
    use crate::model::ModelMetadata;
    use serde_json::json;

    #[test]
    fn test_rename_strip_collapse() {
        let input = json!({
            "name": "input",
            "batch_shape": [null, 28, 28, 1],
            "optional": false,
            "dtype": {
                "module": "keras",
                "class_name": "DTypePolicy",
                "config": {"name": "float32"}
            },
            "quantization_config": null
        });
        let (out, report) = CompatRules::default().repair_with_report(&input);

        assert_eq!(
            out,
            json!({
                "name": "input",
                "batch_input_shape": [null, 28, 28, 1],
                "dtype": "float32"
            })
        );
        assert_eq!(
            report,
            RepairReport {
                renamed: 1,
                stripped: 2,
                collapsed: 1
            }
        );
    }

    #[test]
    fn test_repair_is_recursive() {
        let input = json!({
            "layers": [
                {"config": {"nested": {"deeper": [{"optional": true, "keep": 1}]}}}
            ]
        });
        let out = CompatRules::default().repair(&input);
        assert_eq!(out["layers"][0]["config"]["nested"]["deeper"][0], json!({"keep": 1}));
    }

    #[test]
    fn test_repair_does_not_mutate_input() {
        let input = json!({"optional": true, "dtype": {"name": "float32"}});
        let before = input.clone();
        let _ = CompatRules::default().repair(&input);
        assert_eq!(input, before);
    }

    #[test]
    fn test_existing_target_key_wins() {
        let input = json!({"batch_shape": [1], "batch_input_shape": [2]});
        let out = CompatRules::default().repair(&input);
        assert_eq!(out, json!({"batch_input_shape": [2]}));
    }

    #[test]
    fn test_plain_dtype_string_untouched() {
        let input = json!({"dtype": "float32"});
        let (out, report) = CompatRules::default().repair_with_report(&input);
        assert_eq!(out, input);
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_none_rules_is_identity() {
        let input = drifted_metadata_value(&ModelMetadata::digit_default());
        assert!(CompatRules::none().is_empty());
        assert_eq!(CompatRules::none().repair(&input), input);
    }

    #[test]
    fn test_drifted_metadata_becomes_parseable() {
        let metadata = ModelMetadata::digit_default();
        let drifted = drifted_metadata_value(&metadata);

        assert!(ModelMetadata::from_json_value(drifted.clone()).is_err());

        let repaired = CompatRules::default().repair(&drifted);
        let parsed = ModelMetadata::from_json_value(repaired).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_rules_are_configurable() {
        let rules: CompatRules = serde_json::from_value(json!({
            "renames": [{"from": "input_shape", "to": "batch_input_shape"}],
            "strip_keys": ["trainable"]
        }))
        .unwrap();
        let out = rules.repair(&json!({"input_shape": [1], "trainable": true, "optional": true}));
        assert_eq!(out, json!({"batch_input_shape": [1], "optional": true}));
    }
}
