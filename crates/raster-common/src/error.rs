//! Error types for the style rendering engine.

use thiserror::Error;

/// Result type alias using StyleError.
pub type StyleResult<T> = Result<T, StyleError>;

/// Primary error type for style construction and rendering.
#[derive(Debug, Error)]
pub enum StyleError {
    // === Configuration Errors (raised while building a style) ===
    #[error("Invalid configuration for style '{style}': {message}")]
    Config { style: String, message: String },

    #[error("Unknown band function: {0}")]
    UnknownFunction(String),

    #[error("Style '{0}' does not match any rendering strategy")]
    NoMatchingStrategy(String),

    #[error("Failed to parse style configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    // === Predicate Errors (raised while evaluating flags) ===
    #[error("Band '{band}' has no flag named '{flag}'")]
    UnknownFlag { band: String, flag: String },

    #[error("Invalid value {value} for flag '{flag}'")]
    InvalidFlagValue { flag: String, value: String },

    #[error("Flag '{flag}' on band '{band}' uses bits outside a 64-bit word")]
    InvalidFlagBits { band: String, flag: String },

    #[error("Band '{0}' has no flag definitions")]
    MissingFlagDefinitions(String),

    // === Data Errors ===
    #[error("Band not present in dataset: {0}")]
    MissingBand(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Expected {expected} time slices, got {actual}")]
    TimeSlices { expected: String, actual: usize },

    // === Output Errors ===
    #[error("Legend rendering failed: {0}")]
    Legend(String),

    #[error("Image encoding failed: {0}")]
    Encoding(String),
}

impl StyleError {
    /// Shorthand for a configuration error attributed to a style.
    pub fn config(style: impl Into<String>, message: impl Into<String>) -> Self {
        StyleError::Config {
            style: style.into(),
            message: message.into(),
        }
    }

    /// Whether this error is fatal to style registration rather than to a
    /// single render request.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            StyleError::Config { .. }
                | StyleError::UnknownFunction(_)
                | StyleError::NoMatchingStrategy(_)
                | StyleError::Parse(_)
                | StyleError::Io(_)
        )
    }
}

impl From<std::io::Error> for StyleError {
    fn from(err: std::io::Error) -> Self {
        StyleError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StyleError {
    fn from(err: serde_json::Error) -> Self {
        StyleError::Parse(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_classification() {
        assert!(StyleError::config("ndvi", "missing index_function").is_config_error());
        assert!(StyleError::NoMatchingStrategy("empty".into()).is_config_error());
        assert!(!StyleError::MissingBand("red".into()).is_config_error());
        assert!(!StyleError::TimeSlices {
            expected: "2".into(),
            actual: 3
        }
        .is_config_error());
    }

    #[test]
    fn test_display_includes_style_name() {
        let err = StyleError::config("rgb", "no scale_range");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for style 'rgb': no scale_range"
        );
    }
}
