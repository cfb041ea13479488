//! Face location via an SCRFD model on ONNX Runtime.
//!
//! Frames are reduced to grayscale, letterboxed to the model input, decoded
//! per stride and passed through the model's standard NMS. Boxes are then
//! clamped to the frame and anything smaller than [`MIN_FACE_SIZE`] is
//! dropped. No further merging of overlapping regions happens here.

use crate::preprocess;
use crate::types::Region;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Smallest face edge, in frame pixels, that is reported.
pub const MIN_FACE_SIZE: u32 = 30;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("face detector model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that can find face rectangles in a frame.
///
/// Implementations are shared by every stream, so `locate` takes `&self`.
pub trait FaceLocator: Send + Sync {
    /// Return face regions inside `frame`, each at least
    /// [`MIN_FACE_SIZE`] × [`MIN_FACE_SIZE`]. Order is implementation-defined.
    fn locate(&self, frame: &RgbImage) -> Result<Vec<Region>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// A face box in frame coordinates before clamping.
#[derive(Debug, Clone)]
struct Detection {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    confidence: f32,
}

/// SCRFD-based face locator.
pub struct FaceDetector {
    session: Mutex<Session>,
    input_size: usize,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        // Score and bbox heads for three strides; keypoint heads may follow.
        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session: Mutex::new(session),
            input_size: SCRFD_INPUT_SIZE,
            stride_indices,
        })
    }

    /// Resolve the model file: first `local_dir`, then `system_dir`.
    ///
    /// Returns the local candidate when neither exists so the error names the
    /// path operators are expected to populate.
    pub fn resolve(file_name: &str, local_dir: &Path, system_dir: &Path) -> std::path::PathBuf {
        let local = local_dir.join(file_name);
        if local.exists() {
            return local;
        }
        let system = system_dir.join(file_name);
        if system.exists() {
            tracing::debug!(path = %system.display(), "using bundled face detector model");
            return system;
        }
        local
    }

    /// Preprocess a grayscale frame into a NCHW float tensor with letterbox padding.
    fn preprocess(&self, gray: &[u8], width: usize, height: usize) -> (Array4<f32>, LetterboxInfo) {
        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

        let new_w = ((width as f32 * scale).round() as usize).clamp(1, size);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, size);
        let pad_x = (size - new_w) as f32 / 2.0;
        let pad_y = (size - new_h) as f32 / 2.0;

        let resized = preprocess::resize_bilinear(gray, width, height, new_w, new_h);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                let pixel = if y >= pad_y_start
                    && y < pad_y_start + new_h
                    && x >= pad_x_start
                    && x < pad_x_start + new_w
                {
                    resized[(y - pad_y_start) * new_w + (x - pad_x_start)] as f32
                } else {
                    SCRFD_MEAN // pad value normalizes to 0.0
                };

                let normalized = (pixel - SCRFD_MEAN) / SCRFD_STD;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

impl FaceLocator for FaceDetector {
    fn locate(&self, frame: &RgbImage) -> Result<Vec<Region>, DetectorError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let gray = preprocess::to_grayscale(frame);
        let (input, letterbox) = self.preprocess(gray.as_raw(), width as usize, height as usize);

        let mut session = self.session.lock().map_err(|_| DetectorError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_size,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let regions = to_regions(nms(all_detections, SCRFD_NMS_THRESHOLD), width, height);
        tracing::trace!(faces = regions.len(), "located faces");
        Ok(regions)
    }
}

/// Discover score/bbox output tensors by name.
///
/// Named exports use "score_8", "bbox_16", ...; anything else falls back to the
/// standard positional layout [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [indices[0], indices[1], indices[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes"
            );
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode detections for a single stride level into frame coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Detection> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let bbox_off = idx * 4;
        if bbox_off + 3 >= bboxes.len() {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid) as f32 * step;
        let anchor_cy = (anchor_idx / grid) as f32 * step;

        let x1 = anchor_cx - bboxes[bbox_off] * step;
        let y1 = anchor_cy - bboxes[bbox_off + 1] * step;
        let x2 = anchor_cx + bboxes[bbox_off + 2] * step;
        let y2 = anchor_cy + bboxes[bbox_off + 3] * step;

        let orig_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let orig_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let orig_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let orig_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        detections.push(Detection {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
        });
    }

    detections
}

/// Non-Maximum Suppression over raw anchor detections, highest confidence first.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

/// Clamp detections to the frame and drop those below the minimum face size.
fn to_regions(detections: Vec<Detection>, width: u32, height: u32) -> Vec<Region> {
    detections
        .into_iter()
        .filter_map(|d| Region::clamped(d.x, d.y, d.width, d.height, width, height))
        .filter(|r| r.width >= MIN_FACE_SIZE && r.height >= MIN_FACE_SIZE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Detection {
        Detection { x, y, width: w, height: h, confidence: conf }
    }

    #[test]
    fn test_iou_identical() {
        let a = det(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = det(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(5.0, 5.0, 100.0, 100.0, 0.8),
            det(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_to_regions_drops_small_faces() {
        let detections = vec![
            det(10.0, 10.0, 29.0, 80.0, 0.9),
            det(100.0, 100.0, 30.0, 30.0, 0.8),
            det(200.0, 50.0, 80.0, 20.0, 0.7),
        ];
        let regions = to_regions(detections, 640, 480);
        assert_eq!(regions, vec![Region::new(100, 100, 30, 30)]);
    }

    #[test]
    fn test_to_regions_within_frame_bounds() {
        let detections = vec![
            det(-20.0, -20.0, 120.0, 120.0, 0.9),
            det(600.0, 440.0, 100.0, 100.0, 0.8),
            det(900.0, 10.0, 100.0, 100.0, 0.7),
        ];
        let regions = to_regions(detections, 640, 480);
        assert_eq!(regions.len(), 2);
        for r in &regions {
            assert!(r.fits_within(640, 480), "{r:?} escapes the frame");
            assert!(r.width >= MIN_FACE_SIZE && r.height >= MIN_FACE_SIZE);
        }
    }

    #[test]
    fn test_decode_stride_maps_back_to_frame() {
        // One anchor at grid cell (1, 1) of stride 32 with unit offsets.
        let grid = SCRFD_INPUT_SIZE / 32;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        let idx = (grid + 1) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let letterbox = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 0.0 };
        let dets = decode_stride(&scores, &bboxes, 32, SCRFD_INPUT_SIZE, &letterbox, 0.5);

        assert_eq!(dets.len(), 1);
        // Anchor centre (32, 32), box [0, 64] in input space -> [0, 32] in frame space.
        assert!(dets[0].x.abs() < 1e-4);
        assert!(dets[0].y.abs() < 1e-4);
        assert!((dets[0].width - 32.0).abs() < 1e-4);
        assert!((dets[0].height - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_stride_threshold() {
        let grid = SCRFD_INPUT_SIZE / 32;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let scores = vec![0.5f32; anchors];
        let bboxes = vec![1.0f32; anchors * 4];
        let letterbox = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        assert!(decode_stride(&scores, &bboxes, 32, SCRFD_INPUT_SIZE, &letterbox, 0.5).is_empty());
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(2, 0), (5, 3), (8, 6)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn test_load_missing_model() {
        let result = FaceDetector::load(Path::new("/nonexistent/det_10g.onnx"));
        assert!(matches!(result, Err(DetectorError::ModelNotFound(_))));
    }

    #[test]
    fn test_resolve_falls_back_to_local_path() {
        let missing = Path::new("/nonexistent-moodcam");
        let path = FaceDetector::resolve("det_10g.onnx", missing, missing);
        assert_eq!(path, missing.join("det_10g.onnx"));
    }
}
