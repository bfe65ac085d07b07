//! 描画キャンバスの前処理

pub mod canvas_normalizer;
pub mod data_url;

#[cfg(test)]
pub(crate) mod fixtures;

pub use canvas_normalizer::{
    content_bounds, normalize, smooth, CanvasNormalizer, ContentBounds, NormalizedTensor,
    NormalizerConfig, DEFAULT_PADDING, MODEL_INPUT_SIZE,
};
pub use data_url::{decode_data_url, encode_data_url};
