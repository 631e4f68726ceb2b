//! Error types for the attribute codec

use thiserror::Error;

/// Result type alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Codec error types
///
/// Both variants are fatal: a value that cannot be converted is never
/// dropped or replaced by a default.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Failed to serialize a field into its stored representation
    #[error("Failed to serialize field `{field}`: {source}")]
    Serialization {
        /// Attribute name of the offending field
        field: &'static str,
        /// Underlying serializer error
        #[source]
        source: serde_json::Error,
    },

    /// A stored attribute could not be converted back into a field value
    #[error("Failed to decode field `{field}`: {reason}")]
    Decode {
        /// Attribute name of the offending field
        field: String,
        /// What was wrong with the stored value
        reason: String,
    },
}

impl CodecError {
    /// Builds a decode error for the given attribute
    pub(crate) fn decode(field: impl ToString, reason: impl Into<String>) -> Self {
        Self::Decode {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the attribute the error refers to
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Serialization { field, .. } => field,
            Self::Decode { field, .. } => field.as_str(),
        }
    }
}
