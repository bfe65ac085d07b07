pub mod compat;
pub mod config;
pub mod inference_config;
pub mod model_metadata;
pub mod model_storage;

#[cfg(test)]
pub(crate) mod fixtures;

pub use compat::{CompatRules, KeyRename, RepairReport};
pub use config::{AppConfig, GameSettings, ModelSettings, PreprocessSettings};
pub use inference_config::InferenceConfig;
pub use model_metadata::{ArchitectureConfig, LayerSpec, ModelMetadata, DIGIT_LABELS};
pub use model_storage::{
    load_metadata, load_metadata_value, load_model_binary, load_model_with_metadata,
    print_metadata_info, save_model_with_metadata, save_raw_model_archive,
};
