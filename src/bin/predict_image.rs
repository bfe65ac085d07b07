//! 画像ファイル（またはdata URLを書いたテキストファイル）を分類して結果を表示

#[cfg(feature = "ml")]
fn main() {
    use digit_scribble_lib::game::number_to_text;
    use digit_scribble_lib::logging;
    use digit_scribble_lib::ml::{CpuBackend, DigitPredictor, ModelProvider};
    use digit_scribble_lib::model::AppConfig;
    use digit_scribble_lib::preprocess::CanvasNormalizer;
    use std::path::Path;
    use std::sync::Arc;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: predict_image <model_path> <image_path|data_url.txt> [-v]");
        return;
    }
    logging::init(args.iter().any(|a| a == "-v"));

    let mut config = AppConfig::load_or_default();
    config.set_model_path(args[1].clone());
    let input_path = Path::new(&args[2]);

    let normalizer = CanvasNormalizer::new(config.preprocess.normalizer_config());
    let tensor = if input_path.extension().map_or(false, |e| e == "txt") {
        let payload = match std::fs::read_to_string(input_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("入力ファイルを読めません: {}", e);
                return;
            }
        };
        normalizer.normalize(payload.trim())
    } else {
        match image::open(input_path) {
            Ok(img) => normalizer.normalize_image(&img),
            Err(e) => {
                eprintln!("画像を開けません: {}", e);
                return;
            }
        }
    };

    let tensor = match tensor {
        Ok(t) => t,
        Err(e) => {
            eprintln!("✗ 前処理エラー: {}", e);
            return;
        }
    };

    let provider = Arc::new(ModelProvider::<CpuBackend>::from_config(&config, Default::default()));
    let predictor = DigitPredictor::new(provider);

    match predictor.probabilities(&tensor) {
        Ok(probabilities) => {
            for (digit, p) in probabilities.iter().enumerate() {
                println!("  {}: {:.4}", digit, p);
            }
        }
        Err(e) => {
            eprintln!("✗ 推論エラー: {}", e);
            return;
        }
    }

    match predictor.predict(&tensor) {
        Ok(digit) => println!(
            "予測: {} ({}) [{:?}]",
            digit,
            number_to_text(Some(digit)),
            predictor.provider().state()
        ),
        Err(e) => eprintln!("✗ 推論エラー: {}", e),
    }
}

#[cfg(not(feature = "ml"))]
fn main() {
    eprintln!("predict_image requires the `ml` feature");
}
