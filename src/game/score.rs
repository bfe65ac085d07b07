//! ゲームのスコア記録

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// 1ゲーム分のスコア（訪問者が最初に来たときに作られる）
#[derive(Debug, Clone, PartialEq)]
pub struct GameScore {
    pub id: u64,
    pub correct: u32,
    pub total: u32,
    pub created_at: DateTime<Local>,
}

impl GameScore {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            correct: 0,
            total: 0,
            created_at: Local::now(),
        }
    }

    /// 1回分の結果を反映
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }
}

/// スコアの保存先
pub trait ScoreStore: Send + Sync {
    fn create(&self) -> GameScore;
    fn get(&self, id: u64) -> Option<GameScore>;
    fn save(&self, score: &GameScore);
}

/// メモリ上のスコア保存先
#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    next_id: AtomicU64,
    records: Mutex<HashMap<u64, GameScore>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScoreStore for InMemoryScoreStore {
    fn create(&self) -> GameScore {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let score = GameScore::new(id);
        self.save(&score);
        score
    }

    fn get(&self, id: u64) -> Option<GameScore> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn save(&self, score: &GameScore) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(score.id, score.clone());
    }
}

impl<T: ScoreStore + ?Sized> ScoreStore for std::sync::Arc<T> {
    fn create(&self) -> GameScore {
        (**self).create()
    }

    fn get(&self, id: u64) -> Option<GameScore> {
        (**self).get(id)
    }

    fn save(&self, score: &GameScore) {
        (**self).save(score)
    }
}
