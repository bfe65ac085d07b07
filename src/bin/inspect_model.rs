//! モデルアーカイブのメタデータを表示し、通常読み込み・修復読み込みを試す

#[cfg(feature = "ml")]
fn main() {
    use digit_scribble_lib::logging;
    use digit_scribble_lib::ml::{load_direct, load_repaired, CpuBackend};
    use digit_scribble_lib::model::{load_metadata, print_metadata_info, AppConfig};
    use std::path::PathBuf;

    logging::init(false);

    let args: Vec<String> = std::env::args().collect();
    let config = AppConfig::load_or_default();
    let model_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from(&config.model.model_path)
    };

    println!("Inspect model: {}", model_path.display());

    match load_metadata(&model_path) {
        Ok(metadata) => print_metadata_info(&metadata),
        Err(e) => eprintln!("✗ メタデータを厳格に解釈できません: {:#}", e),
    }

    let device = Default::default();
    match load_direct::<CpuBackend>(&model_path, &device) {
        Ok(loaded) => println!(
            "✓ 通常読み込み成功: {} クラス",
            loaded.inference_config().num_classes()
        ),
        Err(e) => eprintln!("✗ 通常読み込み失敗: {:#}", e),
    }

    match load_repaired::<CpuBackend>(&model_path, &config.compat, &device) {
        Ok(loaded) => println!(
            "✓ 修復読み込み成功: {} クラス",
            loaded.inference_config().num_classes()
        ),
        Err(e) => eprintln!("✗ 修復読み込み失敗: {:#}", e),
    }
}

#[cfg(not(feature = "ml"))]
fn main() {
    eprintln!("inspect_model requires the `ml` feature");
}
