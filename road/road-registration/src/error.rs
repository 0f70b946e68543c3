//! Error types for registration operations.

use thiserror::Error;

/// Errors that can occur during registration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// Source cloud has no points.
    #[error("source cloud has no points")]
    EmptySource,

    /// Target cloud has no points.
    #[error("target cloud has no points")]
    EmptyTarget,

    /// A cloud lacks the normals the method needs.
    #[error("{cloud} cloud has no normals")]
    MissingNormals {
        /// Which cloud lacked them.
        cloud: &'static str,
    },

    /// Paired point sets of different sizes.
    #[error("point sets must have equal length: {source_len} vs {target_len}")]
    MismatchedPairs {
        /// Source point count.
        source_len: usize,
        /// Target point count.
        target_len: usize,
    },

    /// SVD computation failed during transform estimation.
    #[error("SVD computation failed during transform estimation")]
    SvdFailed,

    /// The linearised point-to-plane system could not be solved.
    #[error("point-to-plane system is singular")]
    DegenerateSystem,

    /// No source point found a target point within the distance threshold.
    #[error("no correspondences within {threshold} m")]
    NoCorrespondences {
        /// The correspondence distance threshold.
        threshold: f64,
    },

    /// Feature matching never produced a hypothesis that passed the checkers.
    #[error("feature RANSAC found no valid hypothesis in {iterations} iterations")]
    RansacFailed {
        /// Iterations run.
        iterations: usize,
    },

    /// The estimated transform has non-finite components.
    #[error("estimated transform is not finite")]
    NonFiniteTransform,
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RegistrationError::NoCorrespondences { threshold: 2.0 };
        assert_eq!(err.to_string(), "no correspondences within 2 m");

        let err = RegistrationError::MissingNormals { cloud: "target" };
        assert!(err.to_string().starts_with("target"));
    }
}
