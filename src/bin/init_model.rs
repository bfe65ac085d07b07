//! ランダム初期化した数字分類モデルを書き出す（動作確認用）

#[cfg(feature = "ml")]
fn main() {
    use digit_scribble_lib::logging;
    use digit_scribble_lib::ml::{save_classifier, CpuBackend, DigitClassifier};
    use digit_scribble_lib::model::{AppConfig, ModelMetadata};
    use std::path::PathBuf;
    use tracing::{error, info};

    logging::init(false);

    let args: Vec<String> = std::env::args().collect();
    let output_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from(&AppConfig::load_or_default().model.model_path)
    };

    let metadata = ModelMetadata::digit_default();
    let device = Default::default();
    let classifier = match DigitClassifier::<CpuBackend>::init(&metadata.architecture, &device) {
        Ok(c) => c,
        Err(e) => {
            error!("[InitModel] モデルを構築できません: {:#}", e);
            return;
        }
    };

    match save_classifier(&output_path, &metadata, classifier) {
        Ok(()) => info!("[InitModel] 保存しました: {}", output_path.display()),
        Err(e) => error!("[InitModel] 保存に失敗しました: {:#}", e),
    }
}

#[cfg(not(feature = "ml"))]
fn main() {
    eprintln!("init_model requires the `ml` feature");
}
