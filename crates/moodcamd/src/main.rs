use anyhow::{Context, Result};
use clap::Parser;
use moodcam_core::{FaceDetector, ModelHandle, OverlayPainter};
use moodcam_hw::Camera;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod routes;
mod stream;

use config::Config;
use routes::AppState;

#[derive(Parser)]
#[command(name = "moodcamd", about = "Stream webcam video annotated with detected facial emotions")]
struct Cli {
    /// Listen address (overrides MOODCAM_BIND)
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// V4L2 device path (overrides MOODCAM_CAMERA_DEVICE)
    #[arg(long)]
    camera: Option<String>,
    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        for dev in Camera::list_devices() {
            println!("{}\t{} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
        }
        return Ok(());
    }

    let mut config = Config::from_env();
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(camera) = cli.camera {
        config.camera_device = camera;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "moodcamd starting");

    let detector_path = config.detector_model_path();
    let detector = FaceDetector::load(&detector_path)
        .with_context(|| format!("loading face detector from {}", detector_path.display()))?;
    tracing::info!(path = %detector_path.display(), "SCRFD detector loaded");

    let model = ModelHandle::load(&config.emotion_model_path());
    if model.is_loaded() {
        tracing::info!("emotion model loaded");
    } else {
        tracing::warn!(
            path = %config.emotion_model_path().display(),
            "emotion detection disabled until the model file is provided and the daemon restarted"
        );
    }

    let painter = OverlayPainter::with_override(config.font_path.as_deref())
        .context("preparing overlay font")?;

    let bind = config.bind;
    let state = AppState {
        config: Arc::new(config),
        locator: Arc::new(detector),
        model,
        painter,
        open_source: Arc::new(routes::open_camera),
    };

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(addr = %bind, "moodcamd ready; open http://{bind}/ in a browser");

    // Video streams never finish on their own, so shut down on the signal
    // rather than waiting for connections to drain.
    tokio::select! {
        served = axum::serve(listener, routes::router(state)).into_future() => served?,
        _ = tokio::signal::ctrl_c() => {}
    }

    tracing::info!("moodcamd shutting down");
    Ok(())
}
