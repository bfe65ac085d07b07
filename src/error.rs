//! 正規化・推論で発生するエラー
//!
//! リクエスト境界でクライアント向けメッセージに変換することを前提に、
//! 利用者が直せるもの（入力不正・空キャンバス）と直せないもの（モデル読込失敗）を分けています。

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigitError {
    /// data URLの形式不正、base64不正、画像としてデコードできない入力
    #[error("invalid image payload: {0}")]
    InvalidPayload(String),

    /// 構造は正しいが何も描かれていない
    #[error("empty canvas: please draw something")]
    EmptyCanvas,

    /// どの読み込み方法でもモデルを構築できなかった
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

impl DigitError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        DigitError::InvalidPayload(msg.into())
    }

    /// 利用者側で修正可能なエラーか
    pub fn is_client_error(&self) -> bool {
        matches!(self, DigitError::InvalidPayload(_) | DigitError::EmptyCanvas)
    }
}

pub type DigitResult<T> = std::result::Result<T, DigitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(DigitError::invalid_payload("x").is_client_error());
        assert!(DigitError::EmptyCanvas.is_client_error());
        assert!(!DigitError::ModelUnavailable("broken".into()).is_client_error());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            DigitError::EmptyCanvas.to_string(),
            "empty canvas: please draw something"
        );
        assert_eq!(
            DigitError::invalid_payload("missing ;base64, delimiter").to_string(),
            "invalid image payload: missing ;base64, delimiter"
        );
    }
}
