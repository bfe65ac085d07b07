pub mod loader;
pub mod ml_model;
pub mod predictor;
pub mod provider;

/// CPU推論用バックエンド
pub type CpuBackend = burn_ndarray::NdArray<f32>;

pub use loader::{
    classifier_to_bytes, load_direct, load_repaired, load_with_fallback, save_classifier,
    LoadPath, LoadedModel,
};
pub use ml_model::{DigitClassifier, LayerStep};
pub use predictor::DigitPredictor;
pub use provider::{ModelProvider, ModelState};
