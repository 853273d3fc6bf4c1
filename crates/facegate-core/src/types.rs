use serde::{Deserialize, Serialize};

/// Face region in integer pixel coordinates of one frame.
///
/// Field order follows the detector convention `(top, right, bottom, left)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// `(bottom - top) * (right - left)`, widened so large frames cannot overflow.
    pub fn area(&self) -> i64 {
        i64::from(self.height()) * i64::from(self.width())
    }

    /// Intersect with a `width`×`height` frame.
    ///
    /// Returns `(x, y, w, h)` of the visible part, or `None` when nothing
    /// of the box lies inside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let left = self.left.clamp(0, width as i32);
        let right = self.right.clamp(0, width as i32);
        let top = self.top.clamp(0, height as i32);
        let bottom = self.bottom.clamp(0, height as i32);

        if right <= left || bottom <= top {
            return None;
        }
        Some((
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// One enrolled identity: a label and the embedding computed for it.
///
/// Label and embedding always travel together; an index never holds one
/// without the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub label: String,
    pub embedding: Embedding,
}

/// Outcome of one processed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(String),
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }
}

impl From<Option<String>> for AccessDecision {
    fn from(identity: Option<String>) -> Self {
        match identity {
            Some(label) => AccessDecision::Granted(label),
            None => AccessDecision::Denied,
        }
    }
}
