//! 推論
//!
//! 正規化済みテンソルを共有モデルに通し、確率最大のクラスを数字として返します。
//! Autodiffを含まないバックエンドで実行するため勾配の記録は行いません。

use burn::tensor::{backend::Backend, Tensor};
use std::sync::Arc;

use crate::error::{DigitError, DigitResult};
use crate::ml::loader::LoadedModel;
use crate::ml::provider::ModelProvider;
use crate::preprocess::NormalizedTensor;
use crate::recognizer::DigitRecognizer;

/// 推論エンジン
pub struct DigitPredictor<B: Backend> {
    provider: Arc<ModelProvider<B>>,
}

impl<B: Backend> Clone for DigitPredictor<B> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<B: Backend> DigitPredictor<B> {
    pub fn new(provider: Arc<ModelProvider<B>>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &ModelProvider<B> {
        &self.provider
    }

    /// 単一テンソルを分類
    pub fn predict(&self, tensor: &NormalizedTensor) -> DigitResult<u8> {
        let probabilities = self.probabilities(tensor)?;
        let loaded = self.provider.get_model()?;
        digit_from_probabilities(&loaded, &probabilities)
    }

    /// クラスごとの確率
    pub fn probabilities(&self, tensor: &NormalizedTensor) -> DigitResult<Vec<f32>> {
        let mut rows = self.run(std::slice::from_ref(tensor))?;
        rows.pop()
            .ok_or_else(|| DigitError::ModelUnavailable("推論結果が空です".to_string()))
    }

    /// 複数テンソルをバッチ分類
    pub fn predict_batch(&self, tensors: &[NormalizedTensor]) -> DigitResult<Vec<u8>> {
        if tensors.is_empty() {
            return Ok(Vec::new());
        }
        let loaded = self.provider.get_model()?;
        self.run(tensors)?
            .iter()
            .map(|row| digit_from_probabilities(&loaded, row))
            .collect()
    }

    fn run(&self, tensors: &[NormalizedTensor]) -> DigitResult<Vec<Vec<f32>>> {
        let loaded = self.provider.get_model()?;
        let device = self.provider.device();
        let [_, height, width, channels] = NormalizedTensor::SHAPE;

        let data: Vec<f32> = tensors
            .iter()
            .flat_map(|t| t.as_slice().iter().copied())
            .collect();

        // Tensorに変換 [batch, 28, 28, 1]
        let input = Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([
            tensors.len(),
            height,
            width,
            channels,
        ]);

        let output = loaded.classifier().forward_nhwc(input);
        let [batch, classes] = output.dims();
        let values = output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| DigitError::ModelUnavailable(format!("推論結果の取得エラー: {:?}", e)))?;

        debug_assert_eq!(batch, tensors.len());
        Ok(values.chunks(classes).map(|row| row.to_vec()).collect())
    }
}

/// 最大確率のインデックスを数字に変換（同値なら小さいインデックス）
fn digit_from_probabilities<B: Backend>(
    loaded: &LoadedModel<B>,
    probabilities: &[f32],
) -> DigitResult<u8> {
    let index = argmax(probabilities)
        .ok_or_else(|| DigitError::ModelUnavailable("出力が空です".to_string()))?;
    loaded
        .inference_config()
        .class_index_to_digit(index)
        .ok_or_else(|| {
            DigitError::ModelUnavailable(format!(
                "クラスインデックス {} は数字ではありません",
                index
            ))
        })
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

impl<B: Backend> DigitRecognizer for DigitPredictor<B> {
    fn predict(&self, tensor: &NormalizedTensor) -> DigitResult<u8> {
        DigitPredictor::predict(self, tensor)
    }
}
