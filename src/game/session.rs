//! 訪問者ごとのセッション（文字列キー → スカラー値）

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// セッションキー
pub mod keys {
    pub const GAME_ID: &str = "game_id";
    pub const TARGET: &str = "target";
    pub const LAST_PREDICTED: &str = "last_predicted";
    pub const LAST_TARGET: &str = "last_target";
    pub const LAST_CORRECT: &str = "last_correct";

    /// リスタート時に消すキー
    pub const ROUND_KEYS: [&str; 5] = [GAME_ID, TARGET, LAST_PREDICTED, LAST_TARGET, LAST_CORRECT];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionValue {
    Int(i64),
    Bool(bool),
    Null,
}

impl From<Option<u8>> for SessionValue {
    fn from(value: Option<u8>) -> Self {
        value.map_or(SessionValue::Null, |v| SessionValue::Int(i64::from(v)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    values: HashMap<String, SessionValue>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<SessionValue> {
        self.values.get(key).copied()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            SessionValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            SessionValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// 0-9 の数字として読む
    pub fn get_digit(&self, key: &str) -> Option<u8> {
        self.get_int(key)
            .and_then(|v| u8::try_from(v).ok())
            .filter(|d| *d <= 9)
    }

    pub fn insert(&mut self, key: &str, value: SessionValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<SessionValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
