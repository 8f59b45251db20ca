//! Fall classification over acceleration samples.
//!
//! The detector is a pure function of a single sample: it keeps no state and
//! takes no locks, so any number of dispatch contexts may call it
//! concurrently. Classification never fails; a malformed sample is simply
//! not a fall.

use tracing::debug;

/// Magnitude above which a sample is classified as a fall. Exclusive.
pub const FALL_THRESHOLD: f64 = 10.0;

/// Acceleration-magnitude fall detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallDetector;

impl FallDetector {
    /// Euclidean magnitude of a three-axis sample, or `None` when the sample
    /// does not have exactly three axes.
    pub fn magnitude(sample: &[f64]) -> Option<f64> {
        match *sample {
            [x, y, z] => Some((x * x + y * y + z * z).sqrt()),
            _ => None,
        }
    }

    /// Classify a sample. Returns `true` only for a well-formed sample whose
    /// magnitude is strictly greater than [`FALL_THRESHOLD`].
    pub fn analyse(sample: &[f64]) -> bool {
        match Self::magnitude(sample) {
            Some(magnitude) => magnitude > FALL_THRESHOLD,
            None => {
                debug!(axes = sample.len(), "Ignoring acceleration sample with wrong arity");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_rest_is_not_a_fall() {
        assert!(!FallDetector::analyse(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!FallDetector::analyse(&[10.0, 0.0, 0.0]));
        assert!(FallDetector::analyse(&[10.1, 0.0, 0.0]));
    }

    #[test]
    fn test_uses_all_three_axes() {
        // sqrt(36 + 36 + 36) ~= 10.39
        assert!(FallDetector::analyse(&[6.0, 6.0, 6.0]));
        assert!(FallDetector::analyse(&[-6.0, -6.0, -6.0]));
        // sqrt(25 + 25 + 25) ~= 8.66
        assert!(!FallDetector::analyse(&[5.0, 5.0, 5.0]));
    }

    #[test]
    fn test_manual_override_sample_is_a_fall() {
        assert!(FallDetector::analyse(&[10.0, 10.0, 10.0]));
    }

    #[test]
    fn test_wrong_arity_is_not_a_fall() {
        assert!(!FallDetector::analyse(&[]));
        assert!(!FallDetector::analyse(&[50.0]));
        assert!(!FallDetector::analyse(&[50.0, 50.0]));
        assert!(!FallDetector::analyse(&[50.0, 50.0, 50.0, 50.0]));
    }

    #[test]
    fn test_nan_is_not_a_fall() {
        assert!(!FallDetector::analyse(&[f64::NAN, 0.0, 0.0]));
    }
}
