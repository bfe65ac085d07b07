//! ゲームの進行とスコア管理

pub mod digit_game;
pub mod score;
pub mod session;

pub use digit_game::{
    number_to_text, DigitGame, GameError, ResultView, ScribbleView, SubmitOutcome,
};
pub use score::{GameScore, InMemoryScoreStore, ScoreStore};
pub use session::{keys, Session, SessionValue};
