//! In-memory gallery of known identities.

use crate::encoder::FaceEncoder;
use crate::types::{Embedding, Identity, MatchResult, Matcher};
use image::RgbImage;

/// Ordered set of known identities, rebuilt in full from reference images.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<Identity>,
}

impl Gallery {
    /// Encode every reference image, keeping the first face of each.
    ///
    /// References with no detectable face, or that fail to encode, are left out.
    pub fn build<E>(encoder: &mut E, references: Vec<(String, RgbImage)>) -> Self
    where
        E: FaceEncoder + ?Sized,
    {
        let total = references.len();
        let mut identities = Vec::with_capacity(total);

        for (name, image) in references {
            match encoder.detect_and_encode(&image) {
                Ok(detections) => match detections.into_iter().next() {
                    Some(first) => identities.push(Identity {
                        name,
                        embedding: first.embedding,
                    }),
                    None => tracing::warn!(name = %name, "no face in reference image; identity skipped"),
                },
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "failed to encode reference image; identity skipped");
                }
            }
        }

        tracing::info!(encoded = identities.len(), references = total, "gallery built");
        Self { identities }
    }

    pub fn names(&self) -> Vec<String> {
        self.identities.iter().map(|i| i.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Match a probe against every identity.
    pub fn identify(&self, matcher: &dyn Matcher, probe: &Embedding, threshold: f32) -> MatchResult {
        matcher.compare(probe, &self.identities, threshold)
    }
}
