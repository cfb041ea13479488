//! HTTP surface: viewer page, multipart video feed, emotion list and status.

use crate::config::Config;
use crate::stream::{self, FrameSource, StreamPump};
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use moodcam_core::{Emotion, EmotionClassifier, FaceLocator, FrameAnnotator, ModelHandle, Painter};
use moodcam_hw::{Camera, CameraError};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Opens a fresh capture device for one viewer. Runs on the viewer's thread.
pub type OpenSource = Arc<dyn Fn(&Config) -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync>;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState<P> {
    pub config: Arc<Config>,
    pub locator: Arc<dyn FaceLocator>,
    pub model: ModelHandle,
    pub painter: P,
    pub open_source: OpenSource,
}

/// Open the configured V4L2 camera.
pub fn open_camera(config: &Config) -> Result<Box<dyn FrameSource>, CameraError> {
    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        "viewer connected"
    );
    Ok(Box::new(camera))
}

pub fn router<P>(state: AppState<P>) -> Router
where
    P: Painter + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed::<P>))
        .route("/emotions", get(emotions))
        .route("/status", get(status::<P>))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Stream annotated frames to one viewer.
///
/// Each viewer gets its own capture thread and device handle. Parts flow
/// through a one-slot channel; when the viewer goes away the send fails, the
/// pump is dropped and the device released.
async fn video_feed<P>(State(state): State<AppState<P>>) -> Response
where
    P: Painter + Clone + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(1);

    let annotator = FrameAnnotator::new(
        state.locator.clone(),
        EmotionClassifier::new(state.model.clone()),
        state.painter.clone(),
    );
    let config = state.config.clone();
    let open_source = state.open_source.clone();

    let spawned = std::thread::Builder::new()
        .name("moodcam-stream".into())
        .spawn(move || run_viewer(&config, &*open_source, annotator, tx));
    if let Err(e) = spawned {
        // The sender went down with the closure, so the body below ends at once.
        tracing::error!(error = %e, "failed to spawn stream thread");
    }

    (
        [(header::CONTENT_TYPE, stream::CONTENT_TYPE)],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

fn run_viewer<P: Painter>(
    config: &Config,
    open_source: &(dyn Fn(&Config) -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync),
    annotator: FrameAnnotator<P>,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
) {
    let source = match open_source(config) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(device = %config.camera_device, error = %e, "could not open camera; ending stream");
            return;
        }
    };

    for part in StreamPump::new(source, annotator, config.jpeg_quality) {
        if tx.blocking_send(Ok(part)).is_err() {
            tracing::info!("viewer disconnected");
            break;
        }
    }
}

async fn emotions() -> Json<serde_json::Value> {
    Json(json!({ "emotions": Emotion::ALL }))
}

async fn status<P>(State(state): State<AppState<P>>) -> Json<serde_json::Value>
where
    P: Painter + Clone + Send + Sync + 'static,
{
    Json(json!({
        "model_loaded": state.model.is_loaded(),
        "emotions": Emotion::ALL,
    }))
}
