//! Unified error handling for the voyage planner.
//!
//! Interactive operations (drawing, editing) never surface errors to the
//! caller; they log and return an outcome instead. This type covers the
//! fallible edges: storage, providers and explicit lookups.

use thiserror::Error;

/// Unified error type for voyage planner operations.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Geometry has too few points to form a leg
    #[error("Geometry '{id}' has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        id: String,
        point_count: usize,
        minimum_required: usize,
    },

    /// No segment with the given id
    #[error("Unknown segment '{id}'")]
    UnknownSegment { id: String },

    /// Speed cannot be used for timing
    #[error("Invalid speed {speed} kn")]
    InvalidSpeed { speed: f64 },

    /// Storage error
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Encoding or decoding of a saved route failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP/API error
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status_code: Option<u16>,
    },
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for PlannerError {
    fn from(err: rusqlite::Error) -> Self {
        PlannerError::Persistence {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for PlannerError {
    fn from(err: reqwest::Error) -> Self {
        PlannerError::Http {
            status_code: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Result type alias for voyage planner operations.
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Extension trait for converting Option to PlannerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an unknown segment error.
    fn ok_or_unknown_segment(self, id: &str) -> Result<T>;

    /// Convert Option to Result with an insufficient points error.
    fn ok_or_insufficient_points(self, id: &str, point_count: usize, minimum: usize)
        -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unknown_segment(self, id: &str) -> Result<T> {
        self.ok_or_else(|| PlannerError::UnknownSegment { id: id.to_string() })
    }

    fn ok_or_insufficient_points(
        self,
        id: &str,
        point_count: usize,
        minimum: usize,
    ) -> Result<T> {
        self.ok_or_else(|| PlannerError::InsufficientPoints {
            id: id.to_string(),
            point_count,
            minimum_required: minimum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlannerError::InsufficientPoints {
            id: "leg-1".to_string(),
            point_count: 1,
            minimum_required: 2,
        };
        assert!(err.to_string().contains("leg-1"));
        assert!(err.to_string().contains("1 points"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_unknown_segment("leg-9");
        assert!(matches!(result, Err(PlannerError::UnknownSegment { .. })));

        let result = none.ok_or_insufficient_points("leg-9", 1, 2);
        assert!(matches!(
            result,
            Err(PlannerError::InsufficientPoints { point_count: 1, .. })
        ));
    }

    #[test]
    fn test_json_error_converts() {
        let err: PlannerError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, PlannerError::Serialization(_)));
    }
}
