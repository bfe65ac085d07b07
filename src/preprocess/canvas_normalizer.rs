//! 手描きキャンバスを分類器入力テンソルへ変換する
//!
//! 処理の流れ:
//! 1. data URLの検証・デコード
//! 2. グレースケール化（色・アルファは捨てる）
//! 3. 反転して描画部分の外接矩形を求める（無ければ `EmptyCanvas`）
//! 4. 外接矩形を余白付きで切り出し（画像範囲でクランプ）
//! 5. Lanczos3で28x28へリサイズ
//! 6. 3x3平滑化
//! 7. 白黒反転して [0, 1] へスケーリング（黒背景に白い線 = 学習時の極性）
//! 8. (1, 28, 28, 1) のテンソルとして返す

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use tracing::debug;

use crate::error::{DigitError, DigitResult};
use crate::preprocess::data_url::decode_data_url;

/// 分類器の入力解像度（正方形）
pub const MODEL_INPUT_SIZE: u32 = 28;

/// 外接矩形の周囲に残す余白（ピクセル）
pub const DEFAULT_PADDING: u32 = 20;

/// 平滑化カーネル（中心5, 周囲1, 合計13）
const SMOOTH_KERNEL: [u32; 9] = [1, 1, 1, 1, 5, 1, 1, 1, 1];
const SMOOTH_KERNEL_SUM: u32 = 13;

/// 正規化済みテンソル
///
/// 形状は常に `[1, 28, 28, 1]`（バッチ, 高さ, 幅, チャネル）で、値は [0.0, 1.0]。
/// 行優先で平坦化したデータを保持します。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
}

impl NormalizedTensor {
    pub const SHAPE: [usize; 4] = [1, MODEL_INPUT_SIZE as usize, MODEL_INPUT_SIZE as usize, 1];

    /// 平坦化済みデータから作成（要素数が784でなければエラー）
    pub fn from_vec(data: Vec<f32>) -> DigitResult<Self> {
        let expected = Self::SHAPE.iter().product::<usize>();
        if data.len() != expected {
            return Err(DigitError::invalid_payload(format!(
                "tensor has {} elements (expected {})",
                data.len(),
                expected
            )));
        }
        Ok(Self { data })
    }

    pub fn shape(&self) -> [usize; 4] {
        Self::SHAPE
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// (y, x) の値（範囲外なら `None`）
    pub fn at(&self, y: usize, x: usize) -> Option<f32> {
        let [_, height, width, _] = Self::SHAPE;
        if y >= height || x >= width {
            return None;
        }
        self.data.get(y * width + x).copied()
    }

    pub fn mean(&self) -> f32 {
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// 画像内の矩形（right/bottom は含まない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentBounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl ContentBounds {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// 各辺に `padding` を加え、`width` x `height` の画像範囲に収める
    pub fn padded(&self, padding: u32, width: u32, height: u32) -> ContentBounds {
        ContentBounds {
            left: self.left.saturating_sub(padding),
            top: self.top.saturating_sub(padding),
            right: self.right.saturating_add(padding).min(width),
            bottom: self.bottom.saturating_add(padding).min(height),
        }
    }
}

/// 正規化の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// 外接矩形の余白
    pub padding: u32,
    /// リサイズ後に平滑化するか
    pub smoothing: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            smoothing: true,
        }
    }
}

/// キャンバス画像の正規化器（状態を持たない）
#[derive(Debug, Clone, Default)]
pub struct CanvasNormalizer {
    config: NormalizerConfig,
}

impl CanvasNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// data URLからテンソルを生成
    pub fn normalize(&self, payload: &str) -> DigitResult<NormalizedTensor> {
        let bytes = decode_data_url(payload)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| DigitError::invalid_payload(format!("not a decodable image: {}", e)))?;
        self.normalize_image(&image)
    }

    /// デコード済み画像からテンソルを生成
    pub fn normalize_image(&self, image: &DynamicImage) -> DigitResult<NormalizedTensor> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        debug!("[CanvasNormalizer] 元画像: {}x{} ({:?})", width, height, image.color());

        let bounds = content_bounds(&gray).ok_or(DigitError::EmptyCanvas)?;
        let region = bounds.padded(self.config.padding, width, height);
        let cropped =
            imageops::crop_imm(&gray, region.left, region.top, region.width(), region.height())
                .to_image();
        debug!(
            "[CanvasNormalizer] 描画範囲: {:?} -> 切り出し: {}x{}",
            bounds,
            cropped.width(),
            cropped.height()
        );

        let resized = imageops::resize(
            &cropped,
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE,
            FilterType::Lanczos3,
        );
        let smoothed = if self.config.smoothing {
            smooth(&resized)
        } else {
            resized
        };

        let data: Vec<f32> = smoothed
            .pixels()
            .map(|p| f32::from(255 - p[0]) / 255.0)
            .collect();
        let tensor = NormalizedTensor::from_vec(data)?;

        debug!(
            "[CanvasNormalizer] 反転・正規化後: 平均 {:.3}, 有効画素(>0.1) {}",
            tensor.mean(),
            tensor.as_slice().iter().filter(|v| **v > 0.1).count()
        );
        Ok(tensor)
    }
}

/// デフォルト設定で正規化
pub fn normalize(payload: &str) -> DigitResult<NormalizedTensor> {
    CanvasNormalizer::default().normalize(payload)
}

/// 描画部分の外接矩形
///
/// 反転後に非ゼロ（= 元画像で255未満）の画素を描画とみなします。
/// 単色のキャンバスは色に関係なく描画なしとして `None` を返します。
pub fn content_bounds(gray: &GrayImage) -> Option<ContentBounds> {
    let mut pixels = gray.pixels();
    let first = pixels.next()?[0];
    if pixels.all(|p| p[0] == first) {
        return None;
    }

    let (width, height) = gray.dimensions();
    let mut bounds: Option<ContentBounds> = None;
    for (x, y, pixel) in gray.enumerate_pixels() {
        if 255 - pixel[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => ContentBounds {
                left: x,
                top: y,
                right: x + 1,
                bottom: y + 1,
            },
            Some(b) => ContentBounds {
                left: b.left.min(x),
                top: b.top.min(y),
                right: b.right.max(x + 1),
                bottom: b.bottom.max(y + 1),
            },
        });
    }
    debug_assert!(bounds.map_or(true, |b| b.right <= width && b.bottom <= height));
    bounds
}

/// 3x3平滑化。外周の画素はそのまま残す（外周を0埋めすると反転後に白枠が出る）
pub fn smooth(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return image.clone();
    }

    let mut out = image.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = 0u32;
            for (i, weight) in SMOOTH_KERNEL.iter().enumerate() {
                let dx = (i % 3) as u32;
                let dy = (i / 3) as u32;
                acc += weight * u32::from(image.get_pixel(x + dx - 1, y + dy - 1)[0]);
            }
            let value = (acc + SMOOTH_KERNEL_SUM / 2) / SMOOTH_KERNEL_SUM;
            out.put_pixel(x, y, Luma([value.min(255) as u8]));
        }
    }
    out
}
