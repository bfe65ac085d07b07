//! テスト用のキャンバス画像

use image::{GrayImage, ImageEncoder, Luma, Rgba, RgbaImage};

use crate::preprocess::encode_data_url;

pub fn blank_canvas(width: u32, height: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([value]))
}

/// 白地に黒い正方形 [start, end)
pub fn filled_square(width: u32, height: u32, start: u32, end: u32) -> GrayImage {
    let mut img = blank_canvas(width, height, 255);
    for y in start..end.min(height) {
        for x in start..end.min(width) {
            img.put_pixel(x, y, Luma([0]));
        }
    }
    img
}

/// 白地に黒で「7」を描く（上の横棒 + 斜めの縦棒）
pub fn draw_seven(width: u32, height: u32) -> GrayImage {
    let mut img = blank_canvas(width, height, 255);
    let w = width as f32;
    let h = height as f32;
    let thickness = (width.max(height) / 25).max(2);

    let top_left = (w * 0.30, h * 0.28);
    let top_right = (w * 0.70, h * 0.28);
    let bottom = (w * 0.45, h * 0.78);
    stroke_line(&mut img, top_left, top_right, thickness);
    stroke_line(&mut img, top_right, bottom, thickness);
    img
}

fn stroke_line(img: &mut GrayImage, from: (f32, f32), to: (f32, f32), thickness: u32) {
    let steps = ((to.0 - from.0).abs().max((to.1 - from.1).abs()) as u32).max(1);
    let half = (thickness / 2) as i64;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let cx = (from.0 + (to.0 - from.0) * t) as i64;
        let cy = (from.1 + (to.1 - from.1) * t) as i64;
        for dy in -half..=half {
            for dx in -half..=half {
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
                    img.put_pixel(x as u32, y as u32, Luma([0]));
                }
            }
        }
    }
}

pub fn gray_png_data_url(img: &GrayImage) -> String {
    let mut png = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::L8,
        )
        .expect("png encode");
    encode_data_url("png", &png)
}

/// キャンバスの toDataURL と同じく不透明RGBAとして出力（線は青）
pub fn rgba_png_data_url(img: &GrayImage) -> String {
    let rgba = RgbaImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y)[0] < 128 {
            Rgba([20, 20, 160, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let mut png = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png)
        .write_image(
            rgba.as_raw(),
            rgba.width(),
            rgba.height(),
            image::ExtendedColorType::Rgba8,
        )
        .expect("png encode");
    encode_data_url("png", &png)
}
