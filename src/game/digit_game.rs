//! お題の数字を描いて当ててもらうゲーム
//!
//! 1. `scribble` でお題（0-9）を決めてセッションに保存
//! 2. `submit` で描画を分類し、お題と比較してスコアを更新、次のお題を決める
//! 3. `result` で直前の結果と累計スコアを返す

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, error};

use crate::error::DigitError;
use crate::game::score::{GameScore, ScoreStore};
use crate::game::session::{keys, Session, SessionValue};
use crate::model::AppConfig;
use crate::preprocess::CanvasNormalizer;
use crate::recognizer::DigitRecognizer;

const NUMBER_TEXTS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// 数字の英語表記（範囲外は "unknown"）
pub fn number_to_text(digit: Option<u8>) -> &'static str {
    digit
        .and_then(|d| NUMBER_TEXTS.get(usize::from(d)))
        .copied()
        .unwrap_or("unknown")
}

/// リクエスト境界で返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Missing image payload.")]
    MissingPayload,
    #[error("Invalid image payload: {0}")]
    InvalidPayload(String),
    #[error("Nothing was drawn. Please draw a digit first.")]
    EmptyCanvas,
    #[error("Prediction is unavailable: {0}")]
    ModelUnavailable(String),
}

impl GameError {
    /// 利用者側で修正可能なエラーか
    pub fn is_client_error(&self) -> bool {
        !matches!(self, GameError::ModelUnavailable(_))
    }
}

impl From<DigitError> for GameError {
    fn from(err: DigitError) -> Self {
        match err {
            DigitError::InvalidPayload(msg) => GameError::InvalidPayload(msg),
            DigitError::EmptyCanvas => GameError::EmptyCanvas,
            DigitError::ModelUnavailable(msg) => GameError::ModelUnavailable(msg),
        }
    }
}

/// お題画面
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScribbleView {
    pub target: u8,
    pub target_text: &'static str,
}

/// 判定結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub predicted: u8,
    pub target: Option<u8>,
    pub is_correct: bool,
}

/// 結果画面
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultView {
    pub predicted: Option<u8>,
    pub predicted_text: &'static str,
    pub target: Option<u8>,
    pub target_text: &'static str,
    pub is_correct: bool,
    pub score: u32,
    pub total: u32,
    pub next_target_text: &'static str,
}

pub struct DigitGame<R, S> {
    recognizer: R,
    scores: S,
    normalizer: CanvasNormalizer,
    rng: Mutex<StdRng>,
}

impl<R: DigitRecognizer, S: ScoreStore> DigitGame<R, S> {
    pub fn new(recognizer: R, scores: S, normalizer: CanvasNormalizer, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            recognizer,
            scores,
            normalizer,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_config(recognizer: R, scores: S, config: &AppConfig) -> Self {
        Self::new(
            recognizer,
            scores,
            CanvasNormalizer::new(config.preprocess.normalizer_config()),
            config.game.seed,
        )
    }

    pub fn scores(&self) -> &S {
        &self.scores
    }

    /// お題を決める
    ///
    /// `restart` ならセッションのゲーム情報を消して新しいスコア記録から始める。
    pub fn scribble(&self, session: &mut Session, restart: bool) -> ScribbleView {
        if restart {
            for key in keys::ROUND_KEYS {
                session.remove(key);
            }
        }

        if !session.contains(keys::GAME_ID) {
            let game = self.scores.create();
            session.insert(keys::GAME_ID, score_id_value(&game));
        }

        let target = self.next_target();
        session.insert(keys::TARGET, Some(target).into());

        ScribbleView {
            target,
            target_text: number_to_text(Some(target)),
        }
    }

    /// 描画を判定してスコアを更新
    pub fn submit(
        &self,
        session: &mut Session,
        image: Option<&str>,
    ) -> Result<SubmitOutcome, GameError> {
        let image = image
            .filter(|s| !s.is_empty())
            .ok_or(GameError::MissingPayload)?;

        let predicted = self
            .normalizer
            .normalize(image)
            .and_then(|tensor| self.recognizer.predict(&tensor))
            .map_err(|e| {
                if !e.is_client_error() {
                    error!("[DigitGame] 推論に失敗しました: {}", e);
                }
                GameError::from(e)
            })?;

        let target = session.get_digit(keys::TARGET);
        let mut game = self.current_game(session);

        let is_correct = target == Some(predicted);
        game.record(is_correct);
        self.scores.save(&game);
        debug!(
            "[DigitGame] game {}: 予測 {} / お題 {:?} -> {}/{}",
            game.id, predicted, target, game.correct, game.total
        );

        session.insert(keys::LAST_PREDICTED, Some(predicted).into());
        session.insert(keys::LAST_TARGET, target.into());
        session.insert(keys::LAST_CORRECT, SessionValue::Bool(is_correct));

        let next = self.next_target();
        session.insert(keys::TARGET, Some(next).into());

        Ok(SubmitOutcome {
            predicted,
            target,
            is_correct,
        })
    }

    /// 直前の結果
    pub fn result(&self, session: &Session) -> ResultView {
        let predicted = session.get_digit(keys::LAST_PREDICTED);
        let target = session.get_digit(keys::LAST_TARGET);
        let game = session
            .get_int(keys::GAME_ID)
            .and_then(|id| u64::try_from(id).ok())
            .and_then(|id| self.scores.get(id));

        ResultView {
            predicted,
            predicted_text: number_to_text(predicted),
            target,
            target_text: number_to_text(target),
            is_correct: session.get_bool(keys::LAST_CORRECT).unwrap_or(false),
            score: game.as_ref().map_or(0, |g| g.correct),
            total: game.as_ref().map_or(0, |g| g.total),
            next_target_text: number_to_text(session.get_digit(keys::TARGET)),
        }
    }

    /// セッションのスコア記録（消えていれば作り直す）
    fn current_game(&self, session: &mut Session) -> GameScore {
        let existing = session
            .get_int(keys::GAME_ID)
            .and_then(|id| u64::try_from(id).ok())
            .and_then(|id| self.scores.get(id));

        match existing {
            Some(game) => game,
            None => {
                let game = self.scores.create();
                session.insert(keys::GAME_ID, score_id_value(&game));
                game
            }
        }
    }

    fn next_target(&self) -> u8 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..=9)
    }
}

fn score_id_value(game: &GameScore) -> SessionValue {
    SessionValue::Int(i64::try_from(game.id).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DigitResult;
    use crate::game::score::InMemoryScoreStore;
    use crate::preprocess::fixtures::{blank_canvas, draw_seven, gray_png_data_url};
    use crate::preprocess::NormalizedTensor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 常に同じ数字を返す分類器
    struct FixedRecognizer {
        digit: u8,
        calls: AtomicUsize,
    }

    impl FixedRecognizer {
        fn new(digit: u8) -> Self {
            Self {
                digit,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DigitRecognizer for FixedRecognizer {
        fn predict(&self, tensor: &NormalizedTensor) -> DigitResult<u8> {
            assert_eq!(tensor.shape(), [1, 28, 28, 1]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.digit)
        }
    }

    struct UnavailableRecognizer;

    impl DigitRecognizer for UnavailableRecognizer {
        fn predict(&self, _tensor: &NormalizedTensor) -> DigitResult<u8> {
            Err(DigitError::ModelUnavailable("no model".to_string()))
        }
    }

    fn game(digit: u8) -> DigitGame<Arc<FixedRecognizer>, Arc<InMemoryScoreStore>> {
        DigitGame::new(
            Arc::new(FixedRecognizer::new(digit)),
            Arc::new(InMemoryScoreStore::new()),
            CanvasNormalizer::default(),
            Some(7),
        )
    }

    #[test]
    fn test_number_to_text() {
        assert_eq!(number_to_text(Some(0)), "zero");
        assert_eq!(number_to_text(Some(9)), "nine");
        assert_eq!(number_to_text(Some(10)), "unknown");
        assert_eq!(number_to_text(None), "unknown");
    }

    #[test]
    fn test_scribble_creates_game_and_target() {
        let game = game(7);
        let mut session = Session::new();
        let view = game.scribble(&mut session, false);

        assert!(view.target <= 9);
        assert_eq!(view.target_text, number_to_text(Some(view.target)));
        assert_eq!(session.get_digit(keys::TARGET), Some(view.target));
        assert!(session.contains(keys::GAME_ID));
        assert_eq!(game.scores().len(), 1);

        // 2回目は同じゲームを使う
        game.scribble(&mut session, false);
        assert_eq!(game.scores().len(), 1);
    }

    #[test]
    fn test_correct_and_incorrect_rounds() {
        let game = game(7);
        let mut session = Session::new();
        game.scribble(&mut session, false);
        let image = gray_png_data_url(&draw_seven(280, 280));

        session.insert(keys::TARGET, SessionValue::Int(7));
        let outcome = game.submit(&mut session, Some(&image)).unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome {
                predicted: 7,
                target: Some(7),
                is_correct: true
            }
        );

        session.insert(keys::TARGET, SessionValue::Int(3));
        let outcome = game.submit(&mut session, Some(&image)).unwrap();
        assert!(!outcome.is_correct);

        let view = game.result(&session);
        assert_eq!(view.predicted, Some(7));
        assert_eq!(view.predicted_text, "seven");
        assert_eq!(view.target, Some(3));
        assert_eq!(view.target_text, "three");
        assert!(!view.is_correct);
        assert_eq!((view.score, view.total), (1, 2));
        assert_ne!(view.next_target_text, "unknown");
    }

    #[test]
    fn test_missing_and_invalid_payload() {
        let game = game(1);
        let mut session = Session::new();
        game.scribble(&mut session, false);

        assert_eq!(game.submit(&mut session, None), Err(GameError::MissingPayload));
        assert_eq!(game.submit(&mut session, Some("")), Err(GameError::MissingPayload));

        let err = game.submit(&mut session, Some("not-a-data-url")).unwrap_err();
        assert!(matches!(err, GameError::InvalidPayload(_)));
        assert!(err.to_string().starts_with("Invalid image payload:"));
        assert!(err.is_client_error());

        let blank = gray_png_data_url(&blank_canvas(280, 280, 255));
        assert_eq!(game.submit(&mut session, Some(&blank)), Err(GameError::EmptyCanvas));

        // 失敗した提出はスコアに数えない
        assert_eq!(game.result(&session).total, 0);
        assert!(!session.contains(keys::LAST_PREDICTED));
    }

    #[test]
    fn test_model_unavailable_is_server_error() {
        let game = DigitGame::new(
            UnavailableRecognizer,
            InMemoryScoreStore::new(),
            CanvasNormalizer::default(),
            None,
        );
        let mut session = Session::new();
        let image = gray_png_data_url(&draw_seven(280, 280));
        let err = game.submit(&mut session, Some(&image)).unwrap_err();
        assert!(matches!(err, GameError::ModelUnavailable(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_submit_without_scribble_creates_game() {
        let game = game(4);
        let mut session = Session::new();
        let image = gray_png_data_url(&draw_seven(280, 280));

        let outcome = game.submit(&mut session, Some(&image)).unwrap();
        assert_eq!(outcome.target, None);
        assert!(!outcome.is_correct);
        assert!(session.contains(keys::GAME_ID));
        assert_eq!(session.get(keys::LAST_TARGET), Some(SessionValue::Null));
        assert_eq!(game.result(&session).total, 1);
    }

    #[test]
    fn test_restart_clears_round() {
        let game = game(2);
        let mut session = Session::new();
        game.scribble(&mut session, false);
        let first_id = session.get_int(keys::GAME_ID);
        let image = gray_png_data_url(&draw_seven(280, 280));
        game.submit(&mut session, Some(&image)).unwrap();

        game.scribble(&mut session, true);
        assert_ne!(session.get_int(keys::GAME_ID), first_id);
        assert!(!session.contains(keys::LAST_PREDICTED));
        assert!(!session.contains(keys::LAST_CORRECT));
        assert_eq!(game.result(&session).total, 0);
    }

    #[test]
    fn test_seeded_targets_are_reproducible() {
        let a = game(0);
        let b = game(0);
        let mut sa = Session::new();
        let mut sb = Session::new();
        let ta: Vec<u8> = (0..5).map(|_| a.scribble(&mut sa, false).target).collect();
        let tb: Vec<u8> = (0..5).map(|_| b.scribble(&mut sb, false).target).collect();
        assert_eq!(ta, tb);
    }
}
