//! 正規化済みテンソルから数字を得る処理の抽象
//!
//! ゲーム側はこのトレイト越しに分類器を呼ぶので、モデルなしでもテストできます。

use crate::error::DigitResult;
use crate::preprocess::NormalizedTensor;

pub trait DigitRecognizer: Send + Sync {
    /// 0-9 の数字を返す
    fn predict(&self, tensor: &NormalizedTensor) -> DigitResult<u8>;
}

impl<T: DigitRecognizer + ?Sized> DigitRecognizer for std::sync::Arc<T> {
    fn predict(&self, tensor: &NormalizedTensor) -> DigitResult<u8> {
        (**self).predict(tensor)
    }
}
