//! data URL (`data:image/<subtype>;base64,<payload>`) の検証とデコード

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{DigitError, DigitResult};

/// ヘッダとペイロードの区切り
pub const BASE64_DELIMITER: &str = ";base64,";

/// ヘッダが宣言すべきMIMEタイプの接頭辞
pub const IMAGE_MIME_PREFIX: &str = "data:image/";

/// data URLを検証してバイト列に復元する
///
/// base64は標準アルファベット・正規パディングのみ受け付けます。
/// 不正なバイトを黙って黒画像にしてしまうと、分類器がそれを自信満々に誤分類するためです。
pub fn decode_data_url(payload: &str) -> DigitResult<Vec<u8>> {
    let (header, body) = payload
        .split_once(BASE64_DELIMITER)
        .ok_or_else(|| DigitError::invalid_payload("missing ';base64,' delimiter"))?;

    let subtype = header.strip_prefix(IMAGE_MIME_PREFIX).unwrap_or("");
    if subtype.is_empty() {
        return Err(DigitError::invalid_payload(format!(
            "header '{}' does not declare an image MIME type",
            header
        )));
    }

    STANDARD
        .decode(body)
        .map_err(|e| DigitError::invalid_payload(format!("base64 decode failed: {}", e)))
}

/// バイト列をdata URLに変換する（テスト・CLI用）
pub fn encode_data_url(subtype: &str, bytes: &[u8]) -> String {
    format!("data:image/{}{}{}", subtype, BASE64_DELIMITER, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid() {
        let url = encode_data_url("png", b"\x89PNG");
        assert_eq!(decode_data_url(&url).unwrap(), b"\x89PNG".to_vec());
    }

    #[test]
    fn test_missing_delimiter() {
        let err = decode_data_url("not-a-data-url").unwrap_err();
        assert!(matches!(err, DigitError::InvalidPayload(_)));
    }

    #[test]
    fn test_non_image_mime() {
        let err = decode_data_url("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, DigitError::InvalidPayload(_)));
    }

    #[test]
    fn test_image_prefix_requires_subtype() {
        for url in ["data:imagefoo;base64,aGVsbG8=", "data:image/;base64,aGVsbG8="] {
            let err = decode_data_url(url).unwrap_err();
            assert!(matches!(err, DigitError::InvalidPayload(_)), "{}", url);
        }
        assert!(decode_data_url("data:image/jpeg;base64,aGVsbG8=").is_ok());
    }

    #[test]
    fn test_invalid_characters() {
        let err = decode_data_url("data:image/png;base64,@@@@").unwrap_err();
        assert!(matches!(err, DigitError::InvalidPayload(_)));
    }

    #[test]
    fn test_missing_padding_rejected() {
        // "hello" は "aGVsbG8=" が正規形
        let err = decode_data_url("data:image/png;base64,aGVsbG8").unwrap_err();
        assert!(matches!(err, DigitError::InvalidPayload(_)));
    }

    #[test]
    fn test_only_first_delimiter_splits() {
        // ペイロード側に区切りが現れてもbase64として不正になるだけ
        let err = decode_data_url("data:image/png;base64,AAAA;base64,AAAA").unwrap_err();
        assert!(matches!(err, DigitError::InvalidPayload(_)));
    }
}
