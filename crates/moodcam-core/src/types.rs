use serde::{Deserialize, Serialize};

/// Label drawn when no emotion model is loaded.
pub const MODEL_ERROR_LABEL: &str = "Model Error";
/// Label drawn when preprocessing or inference failed for a face.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Face rectangle in frame pixel coordinates, clamped to the frame it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True when the region lies entirely inside a `width` × `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Convert a float box to an integer region clamped to the frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clamped(x: f32, y: f32, w: f32, h: f32, frame_width: u32, frame_height: u32) -> Option<Self> {
        let x1 = x.round().clamp(0.0, frame_width as f32) as u32;
        let y1 = y.round().clamp(0.0, frame_height as f32) as u32;
        let x2 = (x + w).round().clamp(0.0, frame_width as f32) as u32;
        let y2 = (y + h).round().clamp(0.0, frame_height as f32) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// The closed set of emotions the classifier predicts, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    /// All emotions, indexed the same way as the classifier's output vector.
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Position in [`Emotion::ALL`] and in the model output vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name, e.g. "Happy".
    pub fn name(self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
        }
    }

    /// Lower-cased score map key, e.g. "happy".
    pub fn key(self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }
}

/// Successful classification of one face.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionScores {
    pub dominant: Emotion,
    /// Raw probability of the dominant emotion, 0..1.
    pub confidence: f32,
    /// Per-emotion percentage (raw probability × 100), indexed like [`Emotion::ALL`].
    pub percentages: [f32; 7],
}

impl EmotionScores {
    /// Build scores from raw model probabilities in [`Emotion::ALL`] order.
    ///
    /// The dominant emotion is the argmax; ties go to the earliest emotion.
    pub fn from_probabilities(probs: &[f32; 7]) -> Self {
        let mut best = 0usize;
        for (i, &p) in probs.iter().enumerate().skip(1) {
            if p > probs[best] {
                best = i;
            }
        }

        Self {
            dominant: Emotion::ALL[best],
            confidence: probs[best],
            percentages: probs.map(|p| p * 100.0),
        }
    }

    /// Percentage score for one emotion.
    pub fn percentage(&self, emotion: Emotion) -> f32 {
        self.percentages[emotion.index()]
    }
}

/// Outcome of classifying one face region.
///
/// The two sentinel variants are drawn into the stream like any other label so
/// a degraded pipeline stays visible to the viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Classified(EmotionScores),
    /// No emotion model is loaded for this process.
    ModelAbsent,
    /// Preprocessing or inference failed for this face.
    Failed,
}

impl Classification {
    /// Build the failure sentinel, logging the error that caused it.
    pub fn failed(err: &dyn std::error::Error) -> Self {
        tracing::warn!(error = %err, "emotion classification failed");
        Self::Failed
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Classified(scores) => scores.dominant.name(),
            Self::ModelAbsent => MODEL_ERROR_LABEL,
            Self::Failed => UNKNOWN_LABEL,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::Classified(scores) => scores.confidence,
            Self::ModelAbsent | Self::Failed => 0.0,
        }
    }

    /// Score map as `(lower-cased label, percentage)` pairs in label order.
    /// Empty for both sentinels.
    pub fn scores(&self) -> Vec<(&'static str, f32)> {
        match self {
            Self::Classified(scores) => Emotion::ALL
                .iter()
                .zip(scores.percentages.iter())
                .map(|(e, &pct)| (e.key(), pct))
                .collect(),
            Self::ModelAbsent | Self::Failed => Vec::new(),
        }
    }

    /// The `n` highest scores, descending. Equal scores keep label order.
    pub fn top_scores(&self, n: usize) -> Vec<(&'static str, f32)> {
        let mut ranked = self.scores();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(n);
        ranked
    }

    /// Primary overlay text, e.g. "Happy: 87.50%".
    pub fn caption(&self) -> String {
        format!("{}: {:.2}%", self.label(), self.confidence() * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBS: [f32; 7] = [0.05, 0.01, 0.04, 0.70, 0.10, 0.02, 0.08];

    #[test]
    fn test_region_clamped_inside() {
        let r = Region::clamped(10.4, 20.6, 50.0, 40.0, 640, 480).unwrap();
        assert_eq!(r, Region::new(10, 21, 50, 40));
    }

    #[test]
    fn test_region_clamped_at_edges() {
        let r = Region::clamped(-15.0, 450.0, 100.0, 100.0, 640, 480).unwrap();
        assert_eq!(r, Region::new(0, 450, 85, 30));
        assert!(r.fits_within(640, 480));
    }

    #[test]
    fn test_region_clamped_outside() {
        assert!(Region::clamped(700.0, 10.0, 50.0, 50.0, 640, 480).is_none());
        assert!(Region::clamped(-80.0, 10.0, 50.0, 50.0, 640, 480).is_none());
    }

    #[test]
    fn test_emotion_order_and_names() {
        let names: Vec<_> = Emotion::ALL.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["Angry", "Disgust", "Fear", "Happy", "Sad", "Surprise", "Neutral"]);
        for e in Emotion::ALL {
            assert_eq!(e.key(), e.name().to_lowercase());
        }
    }

    #[test]
    fn test_emotion_serializes_as_name() {
        let json = serde_json::to_string(&Emotion::ALL).unwrap();
        assert_eq!(json, r#"["Angry","Disgust","Fear","Happy","Sad","Surprise","Neutral"]"#);
    }

    #[test]
    fn test_scores_dominant_is_argmax() {
        let scores = EmotionScores::from_probabilities(&PROBS);
        assert_eq!(scores.dominant, Emotion::Happy);
        assert!((scores.confidence - 0.70).abs() < 1e-6);
        assert!((scores.percentage(Emotion::Happy) / 100.0 - scores.confidence).abs() < 1e-6);
    }

    #[test]
    fn test_scores_tie_goes_to_first_label() {
        let probs = [0.1, 0.3, 0.1, 0.3, 0.1, 0.05, 0.05];
        let scores = EmotionScores::from_probabilities(&probs);
        assert_eq!(scores.dominant, Emotion::Disgust);
    }

    #[test]
    fn test_classification_sentinels() {
        let absent = Classification::ModelAbsent;
        assert_eq!(absent.label(), "Model Error");
        assert_eq!(absent.confidence(), 0.0);
        assert!(absent.scores().is_empty());

        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let failed = Classification::failed(&err);
        assert_eq!(failed, Classification::Failed);
        assert_eq!(failed.label(), "Unknown");
        assert_eq!(failed.confidence(), 0.0);
        assert!(failed.top_scores(3).is_empty());
    }

    #[test]
    fn test_score_map_keys_are_lowercase() {
        let c = Classification::Classified(EmotionScores::from_probabilities(&PROBS));
        let keys: Vec<_> = c.scores().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"]);
    }

    #[test]
    fn test_top_scores_ranked_descending() {
        let c = Classification::Classified(EmotionScores::from_probabilities(&PROBS));
        let top = c.top_scores(3);
        let keys: Vec<_> = top.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["happy", "sad", "neutral"]);
        assert!((top[0].1 - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_caption_format() {
        let c = Classification::Classified(EmotionScores::from_probabilities(&PROBS));
        assert_eq!(c.caption(), "Happy: 70.00%");
        assert_eq!(Classification::ModelAbsent.caption(), "Model Error: 0.00%");
    }
}
