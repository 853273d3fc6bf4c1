//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes a grayscale frame to the 640×640 model input, decodes the
//! three stride heads, and applies NMS. Boxes are returned in frame pixel
//! coordinates as [`BoundingBox`] values.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Scale and padding applied when fitting the frame into the model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (SCRFD_INPUT_SIZE as f32 / width as f32)
            .min(SCRFD_INPUT_SIZE as f32 / height as f32);
        let (new_w, new_h) = scaled_dims(width, height, scale);
        Self {
            scale,
            pad_x: (SCRFD_INPUT_SIZE - new_w) / 2,
            pad_y: (SCRFD_INPUT_SIZE - new_h) / 2,
        }
    }

    /// Map a point from model input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

fn scaled_dims(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
    let h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
    (w, h)
}

/// Candidate box in frame space before NMS and rounding.
#[derive(Debug, Clone, Copy)]
struct RawBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
}

impl RawBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn into_detection(self) -> Detection {
        Detection {
            bbox: BoundingBox::new(
                self.y1.round() as i32,
                self.x2.round() as i32,
                self.y2.round() as i32,
                self.x1.round() as i32,
            ),
            confidence: self.confidence,
        }
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

pub struct FaceDetector {
    session: Session,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(path = model_path, outputs = ?output_names, "loaded SCRFD model");

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_indices = output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
        })
    }

    /// Detect faces in a grayscale frame, sorted by descending confidence.
    pub fn detect(&mut self, frame: &GrayImage) -> Result<Vec<Detection>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let letterbox = Letterbox::fit(frame.width(), frame.height());
        let input = preprocess(frame, &letterbox);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[pos];

            let (_, scores) = outputs[score_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[bbox_idx].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;

            candidates.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        Ok(nms(candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .map(RawBox::into_detection)
            .collect())
    }
}

/// Letterbox `frame` into a normalized NCHW tensor, grayscale replicated to 3 channels.
fn preprocess(frame: &GrayImage, letterbox: &Letterbox) -> Array4<f32> {
    let size = SCRFD_INPUT_SIZE as usize;
    let (new_w, new_h) = scaled_dims(frame.width(), frame.height(), letterbox.scale);
    let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    // Padding uses the mean, which normalizes to 0.0.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        if tx >= size || ty >= size {
            continue;
        }
        let normalized = (pixel.0[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = normalized;
        }
    }
    tensor
}

/// Map named outputs ("score_8", "bbox_16", ...) to stride slots.
///
/// Falls back to the standard export order `[scores 8/16/32, bboxes 8/16/32, kps ...]`.
fn output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut named = [(0usize, 0usize); 3];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride)) {
            (Some(score), Some(bbox)) => named[slot] = (score, bbox),
            _ => {
                tracing::debug!(?names, "SCRFD output names not recognized, using positional mapping");
                return [(0, 3), (1, 4), (2, 5)];
            }
        }
    }
    named
}

/// Decode all anchors of one stride whose score clears the confidence threshold.
fn decode_stride(scores: &[f32], bboxes: &[f32], stride: usize, letterbox: &Letterbox) -> Vec<RawBox> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = scores.get(idx).copied()?;
            if score <= SCRFD_CONFIDENCE_THRESHOLD {
                return None;
            }
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.unmap(ax - offsets[0] * step, ay - offsets[1] * step);
            let (x2, y2) = letterbox.unmap(ax + offsets[2] * step, ay + offsets[3] * step);
            Some(RawBox {
                x1,
                y1,
                x2,
                y2,
                confidence: score,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn nms(mut boxes: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &RawBox, b: &RawBox) -> f32 {
    let inter = RawBox {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
        confidence: 0.0,
    }
    .area();
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> RawBox {
        RawBox {
            x1: x,
            y1: y,
            x2: x + w,
            y2: y + h,
            confidence,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = raw(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = raw(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = raw(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let boxes = vec![
            raw(5.0, 5.0, 100.0, 100.0, 0.8),
            raw(0.0, 0.0, 100.0, 100.0, 0.9),
            raw(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let letterbox = Letterbox::fit(320, 240);
        assert_eq!(letterbox.pad_x, 0);
        assert_eq!(letterbox.pad_y, 80);

        let (x, y) = letterbox.unmap(100.0 * letterbox.scale, 50.0 * letterbox.scale + 80.0);
        assert!((x - 100.0).abs() < 0.1, "x: {x}");
        assert!((y - 50.0).abs() < 0.1, "y: {y}");
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let frame = GrayImage::from_pixel(320, 240, image::Luma([255]));
        let letterbox = Letterbox::fit(320, 240);
        let tensor = preprocess(&frame, &letterbox);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let inside = tensor[[0, 2, 320, 320]];
        assert!((inside - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
    }

    #[test]
    fn test_decode_stride_maps_to_bbox() {
        // One anchor above threshold at cell (1, 1) of the stride-32 grid.
        let grid = 640 / 32;
        let mut scores = vec![0.0f32; grid * grid * SCRFD_ANCHORS_PER_CELL];
        let idx = (grid + 1) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        let mut bboxes = vec![0.0f32; scores.len() * 4];
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        let boxes = decode_stride(&scores, &bboxes, 32, &letterbox);
        assert_eq!(boxes.len(), 1);

        let det = boxes[0].into_detection();
        assert_eq!(det.bbox, BoundingBox::new(0, 64, 64, 0));
    }

    #[test]
    fn test_output_indices_named_and_positional() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(output_indices(&names), [(2, 0), (5, 3), (8, 6)]);

        let numeric: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(output_indices(&numeric), [(0, 3), (1, 4), (2, 5)]);
    }
}
