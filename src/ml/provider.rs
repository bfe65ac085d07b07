//! プロセス内で共有する分類モデルの提供
//!
//! 状態遷移: 未読込 → 読込中 → 読込済 / 失敗
//!
//! 読込済と失敗は終端で、同じ `ModelProvider` では再試行しません
//! （壊れたモデルファイルは再読み込みしても直らない）。
//! 最初の呼び出しが重なった場合は1回だけ読み込み、
//! 他の呼び出しはその完了を待って同じ結果を受け取ります。

use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

use crate::error::{DigitError, DigitResult};
use crate::ml::loader::{load_with_fallback, LoadPath, LoadedModel};
use crate::model::{AppConfig, CompatRules, DIGIT_LABELS};
use crate::preprocess::NormalizedTensor;

/// 外から見える読み込み状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loaded(LoadPath),
    Failed,
}

pub struct ModelProvider<B: Backend> {
    model_path: PathBuf,
    rules: CompatRules,
    num_classes: usize,
    device: B::Device,
    cell: OnceLock<DigitResult<Arc<LoadedModel<B>>>>,
    load_attempts: AtomicUsize,
}

impl<B: Backend> ModelProvider<B> {
    pub fn new(model_path: impl Into<PathBuf>, rules: CompatRules, device: B::Device) -> Self {
        Self {
            model_path: model_path.into(),
            rules,
            num_classes: DIGIT_LABELS.len(),
            device,
            cell: OnceLock::new(),
            load_attempts: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &AppConfig, device: B::Device) -> Self {
        Self::new(&config.model.model_path, config.compat.clone(), device)
            .with_num_classes(config.model.num_classes)
    }

    /// 期待するクラス数（既定は10）
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// モデルを取得（初回のみ読み込み）
    ///
    /// 何度呼んでも同じ `Arc` を返す。失敗した場合は同じエラーを返し続ける。
    pub fn get_model(&self) -> DigitResult<Arc<LoadedModel<B>>> {
        self.cell.get_or_init(|| self.load()).clone()
    }

    fn load(&self) -> DigitResult<Arc<LoadedModel<B>>> {
        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "[ModelProvider] モデルを読み込みます: {} (試行 {})",
            self.model_path.display(),
            attempt
        );

        let loaded = load_with_fallback::<B>(&self.model_path, &self.rules, &self.device)
            .and_then(|loaded| {
                check_model(&loaded, self.num_classes)?;
                Ok(loaded)
            });

        match loaded {
            Ok(loaded) => {
                info!(
                    "[ModelProvider] 読み込み完了 ({}): {} クラス",
                    loaded.load_path(),
                    loaded.inference_config().num_classes()
                );
                Ok(Arc::new(loaded))
            }
            Err(e) => {
                error!(
                    "[ModelProvider] モデルを利用できません: {}: {:#}",
                    self.model_path.display(),
                    e
                );
                Err(DigitError::ModelUnavailable(format!("{:#}", e)))
            }
        }
    }

    pub fn state(&self) -> ModelState {
        match self.cell.get() {
            None => ModelState::Unloaded,
            Some(Ok(loaded)) => ModelState::Loaded(loaded.load_path()),
            Some(Err(_)) => ModelState::Failed,
        }
    }

    /// 実際にファイル読み込みを行った回数
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

/// 正規化テンソル (28, 28, 1) を受け付け、設定どおりのクラス数を出力するモデルか
fn check_model<B: Backend>(loaded: &LoadedModel<B>, num_classes: usize) -> anyhow::Result<()> {
    let metadata = loaded.metadata();
    let [_, height, width, channels] = NormalizedTensor::SHAPE;

    match metadata.architecture.input_shape() {
        Some(shape) if shape == (height, width, channels) => {}
        other => anyhow::bail!(
            "モデルの入力形状 {:?} は ({}, {}, {}) と一致しません",
            other,
            height,
            width,
            channels
        ),
    }
    if metadata.model_input_size as usize != height {
        anyhow::bail!(
            "model_input_size {} は入力形状 {}x{} と一致しません",
            metadata.model_input_size,
            height,
            width
        );
    }
    if metadata.class_labels.len() != num_classes {
        anyhow::bail!(
            "クラスラベル数 {} は設定のクラス数 {} と一致しません",
            metadata.class_labels.len(),
            num_classes
        );
    }
    Ok(())
}
