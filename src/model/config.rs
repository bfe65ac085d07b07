//! アプリケーション設定管理モジュール
//!
//! モデルの場所、前処理、互換性修復ルール、ゲーム設定をJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::model::compat::CompatRules;
use crate::preprocess::{NormalizerConfig, DEFAULT_PADDING};

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 使用するモデルファイルのパス
    pub model_path: String,
    /// 分類クラス数（読み込んだモデルのラベル数と一致しなければ利用しない）
    pub num_classes: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "model/digit_model.tar.gz".to_string(),
            num_classes: 10,
        }
    }
}

/// 前処理設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessSettings {
    /// 描画範囲の周囲に残す余白（ピクセル）
    pub padding: u32,
    /// リサイズ後の平滑化
    pub smoothing: bool,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            smoothing: true,
        }
    }
}

impl PreprocessSettings {
    pub fn normalizer_config(&self) -> NormalizerConfig {
        NormalizerConfig {
            padding: self.padding,
            smoothing: self.smoothing,
        }
    }
}

/// ゲーム設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameSettings {
    /// お題の乱数シード（未指定ならOSの乱数）
    #[serde(default)]
    pub seed: Option<u64>,
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// モデル設定
    pub model: ModelSettings,
    /// 前処理設定
    #[serde(default)]
    pub preprocess: PreprocessSettings,
    /// メタデータ修復ルール
    #[serde(default)]
    pub compat: CompatRules,
    /// ゲーム設定
    #[serde(default)]
    pub game: GameSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("[AppConfig] 設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "[AppConfig] 設定ファイルの読み込みに失敗しました ({}): {}。\
                         デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            info!("[AppConfig] 設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// デフォルトパスに設定を保存する
    pub fn save_default(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        self.save(&path)?;
        info!("[AppConfig] 設定ファイルを保存しました: {}", path.display());
        Ok(())
    }

    /// モデルパスを設定
    pub fn set_model_path(&mut self, path: String) {
        self.model.model_path = path;
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("モデルパス: {}", self.model.model_path);
        println!("分類クラス数: {}", self.model.num_classes);
        println!("\n--- 前処理設定 ---");
        println!("余白: {}px", self.preprocess.padding);
        println!("平滑化: {}", self.preprocess.smoothing);
        println!("\n--- 互換性修復 ---");
        for rename in &self.compat.renames {
            println!("キー名変更: {} -> {}", rename.from, rename.to);
        }
        println!("削除キー: {}", self.compat.strip_keys.join(", "));
        println!("dtype畳み込み: {}", self.compat.collapse_policy_keys.join(", "));
        if let Some(seed) = self.game.seed {
            println!("\nお題シード: {}", seed);
        }
        println!("========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model.num_classes, 10);
        assert_eq!(config.preprocess.padding, 20);
        assert!(config.preprocess.smoothing);
        assert_eq!(config.compat, CompatRules::default());
        assert_eq!(config.game.seed, None);
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.set_model_path("elsewhere.tar.gz".to_string());
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.model.model_path, "elsewhere.tar.gz");
        assert_eq!(deserialized.compat, config.compat);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{"model": {"model_path": "m.tar.gz", "num_classes": 10}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.preprocess.padding, DEFAULT_PADDING);
        assert_eq!(config.compat, CompatRules::default());
    }

    #[test]
    fn test_load_or_default_from_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_or_default_from(&path);
        assert_eq!(config.model.model_path, ModelSettings::default().model_path);

        config.save(&path).unwrap();
        assert!(AppConfig::load(&path).is_ok());
    }
}
