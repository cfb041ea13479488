//! moodcam-core — Face location, emotion classification and frame annotation.
//!
//! Faces are found with an SCRFD model and classified with a small emotion
//! CNN, both running via ONNX Runtime on the CPU.

pub mod annotator;
pub mod classifier;
pub mod detector;
pub mod preprocess;
pub mod types;

pub use annotator::{FrameAnnotator, OverlayPainter, Painter, PainterError, TextStyle};
pub use classifier::{ClassifierError, EmotionClassifier, EmotionModel, ModelHandle, OnnxEmotionModel};
pub use detector::{DetectorError, FaceDetector, FaceLocator, MIN_FACE_SIZE};
pub use types::{Classification, Emotion, EmotionScores, Region};
