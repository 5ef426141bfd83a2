use anyhow::Result;
use log::{error, info};
use people_counter::api::rest::RestApi;
use people_counter::detector::{PersonDetector, YoloDetector};
use people_counter::services::{Annotator, DetectionPipeline};
use people_counter::{config, db};
use std::sync::Arc;

async fn run_app() -> Result<()> {
    let config = config::load_from_env()?;

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting people counter service");
    info!("Configuration loaded");

    let detector = PersonDetector::new(Arc::new(YoloDetector::load(&config.detector)?));
    info!("Detector ready ({})", detector.backend_name());

    let annotator = Arc::new(Annotator::new(&config.annotation)?);

    let store = db::connect_store(&config.database).await?;
    info!("Result store ready");

    let pipeline = Arc::new(DetectionPipeline::new(
        detector,
        annotator,
        store,
        &config.storage,
    ));
    pipeline.prepare_dirs()?;
    info!(
        "Serving annotated images from {}",
        pipeline.output_dir().display()
    );

    let http_server = RestApi::new(&config.api, &config.storage, pipeline);
    http_server.run().await?;

    info!("API server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        error!("Application error: {:#}", e);
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
