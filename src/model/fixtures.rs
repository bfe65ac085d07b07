//! テスト用: 別バージョンのシリアライザが書いたようなメタデータを作る

use serde_json::{json, Value};

use crate::model::ModelMetadata;

/// 入力形状のキー名変更・`optional` 付与・dtypeポリシーのオブジェクト化・
/// `quantization_config` 付与を全レイヤに施す
pub fn drifted_metadata_value(metadata: &ModelMetadata) -> Value {
    let mut value = serde_json::to_value(metadata).expect("metadata to json");
    let layers = value["architecture"]["layers"]
        .as_array_mut()
        .expect("layers array");

    for layer in layers {
        let config = layer["config"].as_object_mut().expect("layer config");
        if let Some(shape) = config.remove("batch_input_shape") {
            config.insert("batch_shape".to_string(), shape);
            config.insert("optional".to_string(), Value::Bool(false));
        }
        if let Some(Value::String(dtype)) = config.get("dtype").cloned() {
            config.insert(
                "dtype".to_string(),
                json!({
                    "module": "keras",
                    "class_name": "DTypePolicy",
                    "config": {"name": dtype},
                    "registered_name": null
                }),
            );
            config.insert("quantization_config".to_string(), Value::Null);
        }
    }
    value
}
