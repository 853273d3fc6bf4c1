//! Match the selected face region of a frame against the identity index.

use crate::analyzer::{FaceAnalyzer, RecognitionError};
use crate::index::IdentityIndex;
use crate::selector::select_candidate;
use crate::types::{AccessDecision, BoundingBox, Embedding};
use image::GrayImage;

/// Return the label of the first enrolled record matching the face in `region`.
///
/// Embeddings are scanned in the order the analyzer returns them and records
/// in enrollment order; the first hit wins. No region, an empty index, or a
/// region with no visible pixels yields `None` without touching the analyzer.
pub fn identify<A>(
    analyzer: &mut A,
    frame: &GrayImage,
    region: Option<&BoundingBox>,
    index: &IdentityIndex,
) -> Result<Option<String>, RecognitionError>
where
    A: FaceAnalyzer + ?Sized,
{
    let Some(region) = region else {
        return Ok(None);
    };
    if index.is_empty() {
        return Ok(None);
    }
    let Some((x, y, w, h)) = region.clamp_to(frame.width(), frame.height()) else {
        tracing::debug!(?region, "selected region lies outside the frame");
        return Ok(None);
    };

    let crop = image::imageops::crop_imm(frame, x, y, w, h).to_image();
    let probes = analyzer.encode_faces(&crop)?;
    let known: Vec<&Embedding> = index.iter().map(|r| &r.embedding).collect();

    for probe in &probes {
        let matches = analyzer.compare_faces(&known, probe);
        let n = matches.len().min(index.len());
        if let Some(record) = index
            .iter()
            .zip(&matches[..n])
            .find_map(|(record, &hit)| hit.then_some(record))
        {
            return Ok(Some(record.label.clone()));
        }
    }

    tracing::debug!(probes = probes.len(), "no enrolled face matched");
    Ok(None)
}

/// Run one full recognition cycle on `frame`.
///
/// Locates faces, keeps the single candidate chosen by
/// [`select_candidate`], and matches it against `index`.
pub fn recognize<A>(
    analyzer: &mut A,
    frame: &GrayImage,
    index: &IdentityIndex,
) -> Result<AccessDecision, RecognitionError>
where
    A: FaceAnalyzer + ?Sized,
{
    let faces = analyzer.locate_faces(frame)?;
    let candidate = select_candidate(frame.width(), frame.height(), &faces);
    tracing::debug!(faces = faces.len(), ?candidate, "faces located");
    identify(analyzer, frame, candidate.as_ref(), index).map(AccessDecision::from)
}
