use std::net::SocketAddr;
use std::path::PathBuf;

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const EMOTION_MODEL_FILE: &str = "emotion_model.onnx";

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on (default: 0.0.0.0:5000).
    pub bind: SocketAddr,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width; the driver may negotiate another size.
    pub frame_width: u32,
    /// Requested capture height.
    pub frame_height: u32,
    /// Local model directory, checked first (default: ./models).
    pub model_dir: PathBuf,
    /// Bundled model directory used when a model is missing locally.
    pub system_model_dir: PathBuf,
    /// Explicit overlay font; unset means assets/ then the system DejaVu font.
    pub font_path: Option<PathBuf>,
    /// JPEG quality (1-100) of streamed frames.
    pub jpeg_quality: u8,
}

impl Config {
    /// Load configuration from `MOODCAM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let bind = std::env::var("MOODCAM_BIND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5000)));

        Self {
            bind,
            camera_device: std::env::var("MOODCAM_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            frame_width: env_u32("MOODCAM_FRAME_WIDTH", 640),
            frame_height: env_u32("MOODCAM_FRAME_HEIGHT", 480),
            model_dir: std::env::var("MOODCAM_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            system_model_dir: std::env::var("MOODCAM_SYSTEM_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/usr/share/moodcam/models")),
            font_path: std::env::var("MOODCAM_FONT_PATH").ok().map(PathBuf::from),
            jpeg_quality: env_u32("MOODCAM_JPEG_QUALITY", 95).clamp(1, 100) as u8,
        }
    }

    /// Path to the SCRFD detection model: local directory first, then the
    /// bundled system directory.
    pub fn detector_model_path(&self) -> PathBuf {
        moodcam_core::FaceDetector::resolve(DETECTOR_MODEL_FILE, &self.model_dir, &self.system_model_dir)
    }

    /// Path to the emotion classification model (local directory only).
    pub fn emotion_model_path(&self) -> PathBuf {
        self.model_dir.join(EMOTION_MODEL_FILE)
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            camera_device: "/dev/video0".into(),
            frame_width: 640,
            frame_height: 480,
            model_dir: PathBuf::from("/nonexistent/models"),
            system_model_dir: PathBuf::from("/nonexistent/system"),
            font_path: None,
            jpeg_quality: 95,
        }
    }

    #[test]
    fn test_emotion_model_path_is_fixed_relative() {
        assert_eq!(
            config().emotion_model_path(),
            PathBuf::from("/nonexistent/models/emotion_model.onnx")
        );
    }

    #[test]
    fn test_detector_model_path_falls_back_to_local() {
        assert_eq!(
            config().detector_model_path(),
            PathBuf::from("/nonexistent/models/det_10g.onnx")
        );
    }

    #[test]
    fn test_env_u32_default() {
        assert_eq!(env_u32("MOODCAM_TEST_UNSET_VARIABLE", 7), 7);
    }
}
