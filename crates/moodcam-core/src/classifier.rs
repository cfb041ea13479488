//! Emotion classification of cropped face regions.
//!
//! The classifier never returns an error: a missing model or a failed
//! inference becomes a [`Classification`] sentinel that the annotator draws
//! like any other label.

use crate::preprocess;
use crate::types::{Classification, Emotion, EmotionScores};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Side length of the square grayscale face the model expects.
pub const CLASSIFIER_INPUT_SIZE: usize = 64;
const EMOTION_COUNT: usize = Emotion::ALL.len();

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("emotion model not found: {0}")]
    ModelNotFound(String),
    #[error("empty face region")]
    EmptyRegion,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
    #[error("emotion model session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A loaded emotion model: one `[1, 64, 64, 1]` tensor in, one probability per emotion out.
pub trait EmotionModel: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError>;
}

/// Emotion model exported to ONNX, run through ONNX Runtime.
pub struct OnnxEmotionModel {
    session: Mutex<Session>,
}

impl OnnxEmotionModel {
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded emotion model"
        );

        Ok(Self { session: Mutex::new(session) })
    }
}

impl EmotionModel for OnnxEmotionModel {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let mut session = self.session.lock().map_err(|_| ClassifierError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, probs) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("probability extraction: {e}")))?;

        Ok(probs.to_vec())
    }
}

/// Process-wide handle to the emotion model, present or permanently absent.
///
/// Built once by the process wiring and cloned into every classifier. The
/// model behind it is never replaced.
#[derive(Clone)]
pub struct ModelHandle {
    model: Option<Arc<dyn EmotionModel>>,
}

impl ModelHandle {
    /// Try to load the ONNX emotion model. A failure is logged and yields an
    /// absent handle; it never aborts startup.
    pub fn load(model_path: &Path) -> Self {
        match OnnxEmotionModel::load(model_path) {
            Ok(model) => Self::from_model(model),
            Err(e) => {
                tracing::warn!(
                    path = %model_path.display(),
                    error = %e,
                    "emotion model unavailable; faces will be labelled \"Model Error\""
                );
                Self::absent()
            }
        }
    }

    pub fn from_model(model: impl EmotionModel + 'static) -> Self {
        Self { model: Some(Arc::new(model)) }
    }

    pub fn absent() -> Self {
        Self { model: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").field("loaded", &self.is_loaded()).finish()
    }
}

/// Classifies face crops with the model behind a [`ModelHandle`].
#[derive(Clone, Debug)]
pub struct EmotionClassifier {
    handle: ModelHandle,
}

impl EmotionClassifier {
    pub fn new(handle: ModelHandle) -> Self {
        Self { handle }
    }

    /// Classify one face crop.
    pub fn classify(&self, face: &RgbImage) -> Classification {
        let Some(model) = &self.handle.model else {
            return Classification::ModelAbsent;
        };

        match Self::run(model.as_ref(), face) {
            Ok(scores) => Classification::Classified(scores),
            Err(e) => Classification::failed(&e),
        }
    }

    fn run(model: &dyn EmotionModel, face: &RgbImage) -> Result<EmotionScores, ClassifierError> {
        let input = Self::preprocess(face)?;
        let raw = model.predict(&input)?;

        let probs: [f32; EMOTION_COUNT] = raw.as_slice().try_into().map_err(|_| {
            ClassifierError::InvalidOutput(format!(
                "expected {EMOTION_COUNT} probabilities, got {}",
                raw.len()
            ))
        })?;
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::InvalidOutput(format!("non-finite probability in {probs:?}")));
        }

        Ok(EmotionScores::from_probabilities(&probs))
    }

    /// Grayscale, resize to 64×64, scale to [0, 1], shape `[1, 64, 64, 1]`.
    pub fn preprocess(face: &RgbImage) -> Result<Array4<f32>, ClassifierError> {
        let (width, height) = face.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifierError::EmptyRegion);
        }

        let size = CLASSIFIER_INPUT_SIZE;
        let gray = preprocess::to_grayscale(face);
        let resized = preprocess::resize_bilinear(gray.as_raw(), width as usize, height as usize, size, size);

        let mut tensor = Array4::<f32>::zeros((1, size, size, 1));
        for y in 0..size {
            for x in 0..size {
                tensor[[0, y, x, 0]] = resized[y * size + x] as f32 / 255.0;
            }
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct FixedModel(Vec<f32>);

    impl EmotionModel for FixedModel {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
            assert_eq!(input.shape(), &[1, CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE, 1]);
            Ok(self.0.clone())
        }
    }

    struct BrokenModel;

    impl EmotionModel for BrokenModel {
        fn predict(&self, _input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
            Err(ClassifierError::InferenceFailed("device lost".into()))
        }
    }

    fn face() -> RgbImage {
        RgbImage::from_pixel(48, 40, Rgb([120, 130, 140]))
    }

    #[test]
    fn test_preprocess_output_shape_and_range() {
        let tensor = EmotionClassifier::preprocess(&face()).unwrap();
        assert_eq!(tensor.shape(), &[1, 64, 64, 1]);
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_preprocess_normalization() {
        let white = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let tensor = EmotionClassifier::preprocess(&white).unwrap();
        assert!(tensor.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let black = RgbImage::new(100, 80);
        let tensor = EmotionClassifier::preprocess(&black).unwrap();
        assert!(tensor.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_preprocess_is_reproducible() {
        let mut img = RgbImage::new(97, 83);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 3) as u8, (y * 2) as u8, ((x + y) % 256) as u8]);
        }
        let a = EmotionClassifier::preprocess(&img).unwrap();
        let b = EmotionClassifier::preprocess(&img).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_preprocess_empty_region() {
        let empty = RgbImage::new(0, 10);
        assert!(matches!(
            EmotionClassifier::preprocess(&empty),
            Err(ClassifierError::EmptyRegion)
        ));
    }

    #[test]
    fn test_classify_absent_model() {
        let classifier = EmotionClassifier::new(ModelHandle::absent());
        let result = classifier.classify(&face());
        assert_eq!(result, Classification::ModelAbsent);
        assert_eq!(result.label(), "Model Error");
        assert_eq!(result.confidence(), 0.0);
        assert!(result.scores().is_empty());
    }

    #[test]
    fn test_classify_dominant_matches_score_map() {
        let probs = vec![0.02, 0.01, 0.05, 0.12, 0.10, 0.60, 0.10];
        let classifier = EmotionClassifier::new(ModelHandle::from_model(FixedModel(probs)));
        let result = classifier.classify(&face());

        assert_eq!(result.label(), "Surprise");
        let scores = result.scores();
        assert_eq!(scores.len(), 7);
        let (best_key, best_pct) = scores
            .iter()
            .copied()
            .fold(("", f32::MIN), |acc, s| if s.1 > acc.1 { s } else { acc });
        assert_eq!(best_key, "surprise");
        assert!((result.confidence() - best_pct / 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_classify_inference_failure_is_unknown() {
        let classifier = EmotionClassifier::new(ModelHandle::from_model(BrokenModel));
        let result = classifier.classify(&face());
        assert_eq!(result, Classification::Failed);
        assert_eq!(result.label(), "Unknown");
        assert!(result.scores().is_empty());
    }

    #[test]
    fn test_classify_wrong_output_length_is_unknown() {
        let classifier = EmotionClassifier::new(ModelHandle::from_model(FixedModel(vec![0.5, 0.5])));
        assert_eq!(classifier.classify(&face()), Classification::Failed);
    }

    #[test]
    fn test_classify_non_finite_output_is_unknown() {
        let probs = vec![f32::NAN, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1];
        let classifier = EmotionClassifier::new(ModelHandle::from_model(FixedModel(probs)));
        assert_eq!(classifier.classify(&face()), Classification::Failed);
    }

    #[test]
    fn test_classify_empty_crop_is_unknown() {
        let classifier = EmotionClassifier::new(ModelHandle::from_model(FixedModel(vec![0.0; 7])));
        assert_eq!(classifier.classify(&RgbImage::new(0, 0)), Classification::Failed);
    }

    #[test]
    fn test_handle_load_missing_is_absent() {
        let handle = ModelHandle::load(Path::new("/nonexistent/emotion_model.onnx"));
        assert!(!handle.is_loaded());
    }

    #[test]
    fn test_handle_clones_share_model() {
        let handle = ModelHandle::from_model(FixedModel(vec![0.0; 7]));
        let clone = handle.clone();
        assert!(handle.is_loaded() && clone.is_loaded());
    }
}
