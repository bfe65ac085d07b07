//! モデルメタデータの定義
//!
//! tar.gz 内の `metadata.json` に保存される情報です。
//! アーキテクチャ設定はレイヤ列として保持し、推論時はここからモデルを再構築します。
//!
//! ```json
//! {
//!   "format_version": 2,
//!   "class_labels": ["0", "1", ...],
//!   "model_input_size": 28,
//!   "architecture": {
//!     "name": "digit_cnn",
//!     "layers": [
//!       { "class_name": "InputLayer",
//!         "config": { "name": "input", "batch_input_shape": [null, 28, 28, 1],
//!                     "dtype": "float32" } },
//!       { "class_name": "Conv2D", "config": { "name": "conv2d", "filters": 32, ... } },
//!       ...
//!     ]
//!   },
//!   "trained_at": "2026-01-01T00:00:00+09:00"
//! }
//! ```
//!
//! 読み込みは厳格で、知らないフィールドがあれば失敗します。
//! 形式が変わったファイルは [`crate::model::compat`] で修復してから読み直します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 現在のメタデータ形式
pub const METADATA_FORMAT_VERSION: u32 = 2;

/// 数字クラスのラベル
pub const DIGIT_LABELS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// モデルメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelMetadata {
    pub format_version: u32,

    /// 出力インデックス順のクラスラベル
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形）
    pub model_input_size: u32,

    /// レイヤ構成
    pub architecture: ArchitectureConfig,

    /// 学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(class_labels: Vec<String>, architecture: ArchitectureConfig) -> Self {
        let model_input_size = architecture
            .input_shape()
            .map(|(h, _, _)| h as u32)
            .unwrap_or(0);

        Self {
            format_version: METADATA_FORMAT_VERSION,
            class_labels,
            model_input_size,
            architecture,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// 数字分類用（0-9, 既定アーキテクチャ）
    pub fn digit_default() -> Self {
        Self::new(
            DIGIT_LABELS.iter().map(|s| s.to_string()).collect(),
            ArchitectureConfig::digit_cnn(),
        )
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }

    /// JSONツリーからメタデータを生成
    pub fn from_json_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Failed to deserialize metadata from JSON tree")
    }
}

/// レイヤ構成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchitectureConfig {
    pub name: String,
    pub layers: Vec<LayerSpec>,
}

/// 各レイヤの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum LayerSpec {
    InputLayer(InputLayerConfig),
    Conv2D(Conv2dLayerConfig),
    MaxPooling2D(PoolLayerConfig),
    Flatten(FlattenLayerConfig),
    Dense(DenseLayerConfig),
    Dropout(DropoutLayerConfig),
}

impl LayerSpec {
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::InputLayer(c) => &c.name,
            LayerSpec::Conv2D(c) => &c.name,
            LayerSpec::MaxPooling2D(c) => &c.name,
            LayerSpec::Flatten(c) => &c.name,
            LayerSpec::Dense(c) => &c.name,
            LayerSpec::Dropout(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputLayerConfig {
    pub name: String,
    /// (batch, height, width, channels)。バッチは可変なので `null`
    pub batch_input_shape: Vec<Option<usize>>,
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conv2dLayerConfig {
    pub name: String,
    pub filters: usize,
    pub kernel_size: [usize; 2],
    pub activation: Activation,
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolLayerConfig {
    pub name: String,
    pub pool_size: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlattenLayerConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenseLayerConfig {
    pub name: String,
    pub units: usize,
    pub activation: Activation,
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropoutLayerConfig {
    pub name: String,
    pub rate: f64,
}

impl ArchitectureConfig {
    /// 既定の数字分類CNN
    ///
    /// - Input 28x28x1
    /// - Conv 3x3 (32) + ReLU -> MaxPool 2x2
    /// - Conv 3x3 (64) + ReLU -> MaxPool 2x2
    /// - Flatten -> Dense 128 + ReLU -> Dropout 0.5
    /// - Dense 10 + Softmax
    pub fn digit_cnn() -> Self {
        let float = || "float32".to_string();
        Self {
            name: "digit_cnn".to_string(),
            layers: vec![
                LayerSpec::InputLayer(InputLayerConfig {
                    name: "input".to_string(),
                    batch_input_shape: vec![None, Some(28), Some(28), Some(1)],
                    dtype: float(),
                }),
                LayerSpec::Conv2D(Conv2dLayerConfig {
                    name: "conv2d".to_string(),
                    filters: 32,
                    kernel_size: [3, 3],
                    activation: Activation::Relu,
                    dtype: float(),
                }),
                LayerSpec::MaxPooling2D(PoolLayerConfig {
                    name: "max_pooling2d".to_string(),
                    pool_size: [2, 2],
                }),
                LayerSpec::Conv2D(Conv2dLayerConfig {
                    name: "conv2d_1".to_string(),
                    filters: 64,
                    kernel_size: [3, 3],
                    activation: Activation::Relu,
                    dtype: float(),
                }),
                LayerSpec::MaxPooling2D(PoolLayerConfig {
                    name: "max_pooling2d_1".to_string(),
                    pool_size: [2, 2],
                }),
                LayerSpec::Flatten(FlattenLayerConfig {
                    name: "flatten".to_string(),
                }),
                LayerSpec::Dense(DenseLayerConfig {
                    name: "dense".to_string(),
                    units: 128,
                    activation: Activation::Relu,
                    dtype: float(),
                }),
                LayerSpec::Dropout(DropoutLayerConfig {
                    name: "dropout".to_string(),
                    rate: 0.5,
                }),
                LayerSpec::Dense(DenseLayerConfig {
                    name: "dense_1".to_string(),
                    units: 10,
                    activation: Activation::Softmax,
                    dtype: float(),
                }),
            ],
        }
    }

    /// 入力形状 (height, width, channels)
    pub fn input_shape(&self) -> Option<(usize, usize, usize)> {
        self.layers.iter().find_map(|layer| match layer {
            LayerSpec::InputLayer(c) => match c.batch_input_shape.as_slice() {
                [_, Some(h), Some(w), Some(ch)] => Some((*h, *w, *ch)),
                _ => None,
            },
            _ => None,
        })
    }

    /// 最終Denseの出力数
    pub fn num_outputs(&self) -> Option<usize> {
        self.layers.iter().rev().find_map(|layer| match layer {
            LayerSpec::Dense(c) => Some(c.units),
            _ => None,
        })
    }
}
