//! 手描き数字当てゲームのコア
//!
//! - [`preprocess`]: キャンバスの data URL を 28x28 のテンソルへ正規化
//! - [`ml`]: 分類モデルの遅延読み込み（互換修復付き）と推論
//! - [`game`]: お題・判定・スコアのゲーム進行

pub mod error;
pub mod game;
pub mod logging;
#[cfg(feature = "ml")]
pub mod ml;
pub mod model;
pub mod preprocess;
pub mod recognizer;

pub use error::{DigitError, DigitResult};
pub use recognizer::DigitRecognizer;

#[cfg(feature = "ml")]
pub use ml::{CpuBackend, DigitPredictor, ModelProvider};

/// 設定ファイルからCPU推論用のゲームを組み立てる
///
/// モデルは最初の判定時に読み込まれる。
#[cfg(feature = "ml")]
pub fn build_game(
    config: &model::AppConfig,
) -> game::DigitGame<DigitPredictor<CpuBackend>, game::InMemoryScoreStore> {
    let provider = std::sync::Arc::new(ModelProvider::<CpuBackend>::from_config(
        config,
        Default::default(),
    ));
    game::DigitGame::from_config(
        DigitPredictor::new(provider),
        game::InMemoryScoreStore::new(),
        config,
    )
}
