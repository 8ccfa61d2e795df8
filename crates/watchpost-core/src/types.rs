use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Map the box (and its landmarks) into a frame `factor` times larger.
    ///
    /// Used to bring detections made on a downscaled frame back to full resolution.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
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
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A known person enrolled in the gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Display label derived from the reference image filename.
    pub name: String,
    pub embedding: Embedding,
}

/// One face found in a frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Outcome of comparing one probe against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Matched the gallery entry at `index`.
    Known { index: usize, name: String },
    /// No gallery entry within the threshold.
    Unknown,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub verdict: Verdict,
    /// Distance to the nearest gallery entry; `f32::INFINITY` for an empty gallery.
    pub distance: f32,
}

impl MatchResult {
    pub fn is_known(&self) -> bool {
        matches!(self.verdict, Verdict::Known { .. })
    }

    /// Matched identity name, if any.
    pub fn name(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::Known { name, .. } => Some(name),
            Verdict::Unknown => None,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of known faces.
///
/// A probe is `Known` iff its nearest distance is strictly below `threshold`.
pub trait Matcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32;

    fn compare(&self, probe: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        // Strict `<` keeps the first entry on ties.
        for (i, identity) in gallery.iter().enumerate() {
            let dist = self.distance(probe, &identity.embedding);
            if best_idx.is_none() || dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < threshold => MatchResult {
                verdict: Verdict::Known {
                    index: idx,
                    name: gallery[idx].name.clone(),
                },
                distance: best_dist,
            },
            _ => MatchResult {
                verdict: Verdict::Unknown,
                distance: best_dist,
            },
        }
    }
}

/// Euclidean distance matcher.
///
/// On unit-length embeddings `d = sqrt(2 - 2 * cos)`, so a threshold of 0.45
/// means cosine similarity above about 0.9.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        a.euclidean_distance(b)
    }
}

/// Cosine distance matcher (`1 - cosine similarity`, in [0, 2]).
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        1.0 - a.similarity(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, values: Vec<f32>) -> Identity {
        Identity {
            name: name.into(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_default_euclidean_threshold_in_cosine_terms() {
        let theta = 0.899f32.acos();
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![theta.cos(), theta.sin()]);

        let euclidean = EuclideanMatcher.distance(&a, &b);
        assert!((euclidean - 0.45).abs() < 0.01, "{euclidean}");
        let cosine = CosineMatcher.distance(&a, &b);
        assert!((cosine - 0.101).abs() < 0.01, "{cosine}");
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_matcher_picks_nearest() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            identity("Alice", vec![0.0, 1.0, 0.0]),
            identity("Bob", vec![0.0, 0.0, 1.0]),
            identity("Carol", vec![0.9, 0.1, 0.0]),
        ];

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.45);
        assert_eq!(
            result.verdict,
            Verdict::Known { index: 2, name: "Carol".into() }
        );
        assert!(result.distance < 0.45);
    }

    #[test]
    fn test_euclidean_matcher_threshold_is_strict() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![identity("Alice", vec![0.5, 0.0])];

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert_eq!(result.verdict, Verdict::Unknown);
        assert!((result.distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_matcher_distance_above_threshold_is_unknown() {
        // Nearest entry at 0.50 against the default 0.45 threshold.
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity("Alice", vec![0.5, 0.0]),
            identity("Bob", vec![0.0, 0.9]),
        ];

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.45);
        assert!(!result.is_known());
        assert_eq!(result.name(), None);
        assert!((result.distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_matcher_tie_prefers_first() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity("First", vec![0.1, 0.0]),
            identity("Second", vec![0.0, 0.1]),
        ];

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.45);
        assert_eq!(
            result.verdict,
            Verdict::Known { index: 0, name: "First".into() }
        );
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &[], 0.45);
        assert_eq!(result.verdict, Verdict::Unknown);
        assert!(result.distance.is_infinite());

        let result = CosineMatcher.compare(&probe, &[], 0.45);
        assert_eq!(result.verdict, Verdict::Unknown);
    }

    #[test]
    fn test_cosine_matcher_no_match() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![identity("other", vec![0.0, 1.0, 0.0])];

        let result = CosineMatcher.compare(&probe, &gallery, 0.5);
        assert!(!result.is_known());
        assert!((result.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_matcher_match() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            identity("decoy", vec![0.0, 1.0]),
            identity("match", vec![2.0, 0.0]),
        ];

        let result = CosineMatcher.compare(&probe, &gallery, 0.5);
        assert_eq!(result.name(), Some("match"));
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn test_bbox_scaled() {
        let bbox = BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
            confidence: 0.9,
            landmarks: Some([(1.0, 2.0); 5]),
        };
        let big = bbox.scaled(4.0);
        assert_eq!((big.x, big.y, big.width, big.height), (40.0, 80.0, 120.0, 160.0));
        assert_eq!(big.confidence, 0.9);
        assert_eq!(big.landmarks, Some([(4.0, 8.0); 5]));
    }
}
