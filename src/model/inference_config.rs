//! モデルメタデータから推論に必要な情報を取り出す

use crate::model::model_metadata::ModelMetadata;

/// 推論用情報
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// 出力インデックス順のクラスラベル
    pub class_labels: Vec<String>,

    /// モデル入力解像度
    pub model_input_size: u32,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.clone(),
            model_input_size: metadata.model_input_size,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    pub fn class_index_to_label(&self, index: usize) -> Option<&str> {
        self.class_labels.get(index).map(String::as_str)
    }

    /// 出力インデックスを数字（0-9）に変換
    ///
    /// ラベルが数字として読めない場合は `None`
    pub fn class_index_to_digit(&self, index: usize) -> Option<u8> {
        self.class_index_to_label(index)?
            .parse::<u8>()
            .ok()
            .filter(|d| *d <= 9)
    }
}
