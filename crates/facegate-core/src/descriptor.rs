//! Face descriptors, their portable string encoding, and matching.

use thiserror::Error;

use crate::geometry::euclidean_distance;

/// Width of the face-recognition embedding.
pub const DESCRIPTOR_DIM: usize = 128;

/// Distance below which two descriptors are the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("invalid descriptor dimension: {0} (expected 128)")]
    InvalidDimension(usize),
    #[error("invalid descriptor value (NaN/Inf)")]
    InvalidValue,
    #[error("malformed descriptor encoding: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Fixed-length identity embedding. Values are always finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::InvalidDimension(values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DescriptorError::InvalidValue);
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Portable string form: a JSON array of numbers.
    pub fn encode(&self) -> String {
        // Serializing a slice of finite f32 cannot fail.
        serde_json::to_string(&self.values).unwrap_or_default()
    }

    pub fn decode(encoded: &str) -> Result<Self, DescriptorError> {
        let values: Vec<f32> = serde_json::from_str(encoded)?;
        Self::new(values)
    }

    pub fn distance(&self, other: &Descriptor) -> f32 {
        // Both sides are DESCRIPTOR_DIM long by construction.
        euclidean_distance(&self.values, &other.values).unwrap_or(f32::INFINITY)
    }
}

/// Outcome of comparing a candidate against a stored descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// `None` when either side failed to decode.
    pub distance: Option<f32>,
}

/// Euclidean-distance matcher with a fixed acceptance threshold.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn compare(&self, stored: &Descriptor, candidate: &Descriptor) -> MatchResult {
        let distance = stored.distance(candidate);
        MatchResult {
            matched: distance < self.threshold,
            distance: Some(distance),
        }
    }

    /// Compare two encoded descriptors. Malformed input is a non-match.
    pub fn compare_encoded(&self, stored: &str, candidate: &str) -> MatchResult {
        match (Descriptor::decode(stored), Descriptor::decode(candidate)) {
            (Ok(stored), Ok(candidate)) => self.compare(&stored, &candidate),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "descriptor decode failed; treating as non-match");
                MatchResult {
                    matched: false,
                    distance: None,
                }
            }
        }
    }
}

/// `true` iff both encodings decode and lie strictly closer than the default
/// threshold.
pub fn matches(stored: &str, candidate: &str) -> bool {
    EuclideanMatcher::default()
        .compare_encoded(stored, candidate)
        .matched
}
