//! In-memory index of enrolled identities.

use crate::analyzer::{FaceAnalyzer, RecognitionError};
use crate::types::FaceRecord;
use image::GrayImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("no face detected in enrollment image for {label}")]
    NoFaceDetected { label: String },
    #[error("failed to compute enrollment embedding: {0}")]
    Recognition(#[from] RecognitionError),
}

#[derive(Error, Debug)]
pub enum IndexLoadError {
    #[error("failed to compute embedding for {label}: {source}")]
    Recognition {
        label: String,
        #[source]
        source: RecognitionError,
    },
}

/// One enrolled image handed to [`IdentityIndex::load_all`].
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub label: String,
    pub image: GrayImage,
}

/// Ordered set of enrolled faces. Earlier records win ties when matching.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    records: Vec<FaceRecord>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from `images`, replacing the current contents.
    ///
    /// Images without a detectable face are skipped. If the analyzer fails
    /// on any image the current contents are kept and the error returned.
    pub fn load_all<A, I>(&mut self, analyzer: &mut A, images: I) -> Result<usize, IndexLoadError>
    where
        A: FaceAnalyzer + ?Sized,
        I: IntoIterator<Item = LabeledImage>,
    {
        tracing::info!("initializing encodings of known faces");

        let mut records = Vec::new();
        let mut processed = 0usize;
        for LabeledImage { label, image } in images {
            processed += 1;
            let embeddings = analyzer
                .encode_faces(&image)
                .map_err(|source| IndexLoadError::Recognition {
                    label: label.clone(),
                    source,
                })?;

            match embeddings.into_iter().next() {
                Some(embedding) => records.push(FaceRecord { label, embedding }),
                None => tracing::warn!(%label, "no face found in enrolled image, skipping"),
            }
        }

        self.records = records;
        tracing::info!(processed, loaded = self.records.len(), "identity index loaded");
        Ok(self.records.len())
    }

    /// Append one identity computed from `image`.
    pub fn enroll<A>(
        &mut self,
        analyzer: &mut A,
        image: &GrayImage,
        label: &str,
    ) -> Result<(), EnrollmentError>
    where
        A: FaceAnalyzer + ?Sized,
    {
        tracing::info!(label, "creating encoding for new face");
        let embedding = analyzer
            .encode_faces(image)?
            .into_iter()
            .next()
            .ok_or_else(|| EnrollmentError::NoFaceDetected {
                label: label.to_string(),
            })?;

        self.records.push(FaceRecord {
            label: label.to_string(),
            embedding,
        });
        tracing::info!(label, enrolled = self.records.len(), "face enrolled");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in enrollment order.
    pub fn iter(&self) -> std::slice::Iter<'_, FaceRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a IdentityIndex {
    type Item = &'a FaceRecord;
    type IntoIter = std::slice::Iter<'a, FaceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
