//! モデルファイルの読み込み
//!
//! 1. 通常読み込み: `metadata.json` を厳格に解釈してモデルを再構築
//! 2. 修復読み込み: 1が失敗したときだけ、`metadata.json` をJSONツリーとして読み直し、
//!    [`CompatRules`] で既知の差異を直してから再構築
//!
//! どちらも重みは同じ `model.bin` から読み、層数と形状を照合してから適用します。

use anyhow::{anyhow, Context, Result};
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::ml::ml_model::{DigitClassifier, DigitClassifierRecord};
use crate::model::{
    load_metadata_value, load_model_binary, load_model_with_metadata, save_model_with_metadata,
    CompatRules, InferenceConfig, ModelMetadata,
};

/// どの経路で読み込めたか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    Direct,
    Repaired,
}

impl fmt::Display for LoadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPath::Direct => write!(f, "direct"),
            LoadPath::Repaired => write!(f, "repaired"),
        }
    }
}

/// 読み込み済みモデル
///
/// Burnのモジュールは `Sync` ではないため、スレッド間で共有できるよう `Mutex` に入れる。
#[derive(Debug)]
pub struct LoadedModel<B: Backend> {
    classifier: Mutex<DigitClassifier<B>>,
    metadata: ModelMetadata,
    config: InferenceConfig,
    load_path: LoadPath,
}

impl<B: Backend> LoadedModel<B> {
    fn new(classifier: DigitClassifier<B>, metadata: ModelMetadata, load_path: LoadPath) -> Self {
        let config = InferenceConfig::from_metadata(&metadata);
        Self {
            classifier: Mutex::new(classifier),
            metadata,
            config,
            load_path,
        }
    }

    /// 推論用に分類器を複製（重みのテンソルは共有される）
    pub fn classifier(&self) -> DigitClassifier<B> {
        self.classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn inference_config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn load_path(&self) -> LoadPath {
        self.load_path
    }
}

/// 通常読み込み
pub fn load_direct<B: Backend>(model_path: &Path, device: &B::Device) -> Result<LoadedModel<B>> {
    let (metadata, model_binary) = load_model_with_metadata(model_path)?;
    let classifier = restore_classifier(&metadata, model_binary, device)?;
    Ok(LoadedModel::new(classifier, metadata, LoadPath::Direct))
}

/// 修復読み込み
pub fn load_repaired<B: Backend>(
    model_path: &Path,
    rules: &CompatRules,
    device: &B::Device,
) -> Result<LoadedModel<B>> {
    let raw = load_metadata_value(model_path)?;
    let (patched, report) = rules.repair_with_report(&raw);
    info!(
        "[ModelLoader] メタデータを修復: キー名変更 {}, 削除 {}, dtype畳み込み {}",
        report.renamed, report.stripped, report.collapsed
    );

    let metadata = ModelMetadata::from_json_value(patched)
        .context("修復後のメタデータを解釈できません")?;
    let model_binary = load_model_binary(model_path)?;
    let classifier = restore_classifier(&metadata, model_binary, device)?;
    Ok(LoadedModel::new(classifier, metadata, LoadPath::Repaired))
}

/// 通常読み込み、失敗したら修復読み込み
pub fn load_with_fallback<B: Backend>(
    model_path: &Path,
    rules: &CompatRules,
    device: &B::Device,
) -> Result<LoadedModel<B>> {
    let primary = match load_direct(model_path, device) {
        Ok(loaded) => return Ok(loaded),
        Err(e) => e,
    };
    warn!(
        "[ModelLoader] 通常読み込みに失敗しました。修復読み込みを試します: {:#}",
        primary
    );

    load_repaired(model_path, rules, device).map_err(|fallback| {
        anyhow!(
            "通常読み込み: {:#} / 修復読み込み: {:#}",
            primary,
            fallback
        )
    })
}

/// メタデータからモデルを組み立て、重みを適用
fn restore_classifier<B: Backend>(
    metadata: &ModelMetadata,
    model_binary: Vec<u8>,
    device: &B::Device,
) -> Result<DigitClassifier<B>> {
    let template = DigitClassifier::<B>::init(&metadata.architecture, device)?;
    if template.num_outputs() != metadata.class_labels.len() {
        return Err(anyhow!(
            "出力数 {} とクラスラベル数 {} が一致しません",
            template.num_outputs(),
            metadata.class_labels.len()
        ));
    }

    // BinBytesRecorder は不正なバイト列で panic するので、エラーに変換する
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record: DigitClassifierRecord<B> =
        panic::catch_unwind(AssertUnwindSafe(|| recorder.load(model_binary, device)))
            .map_err(|cause| {
                anyhow!("モデル重みを復元できません: {}", panic_message(&*cause))
            })?
            .map_err(|e| anyhow!("モデル重みの読み込みエラー: {:?}", e))?;
    template.verify_record(&record)?;

    Ok(template.load_record(record))
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// モデルの重みをバイト列にする
pub fn classifier_to_bytes<B: Backend>(classifier: DigitClassifier<B>) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    Recorder::<B>::record(&recorder, classifier.into_record(), ())
        .map_err(|e| anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

/// モデルをメタデータと共に保存
pub fn save_classifier<B: Backend>(
    output_path: &Path,
    metadata: &ModelMetadata,
    classifier: DigitClassifier<B>,
) -> Result<()> {
    let model_binary = classifier_to_bytes(classifier)?;
    save_model_with_metadata(output_path, metadata, &model_binary)
}
