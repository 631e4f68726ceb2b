//! Education sub-codec
//!
//! Education is compound and never queried, so it is stored as a single
//! JSON string attribute instead of being decomposed into nested maps.

use super::error::{CodecError, CodecResult};
use crate::user::{Education, UserAttribute};

/// Serializes an education record into its stored JSON blob
///
/// # Errors
///
/// Returns `CodecError::Serialization` naming the `education` field if the
/// record cannot be serialized
pub fn to_blob(education: &Education) -> CodecResult<String> {
    serde_json::to_string(education).map_err(|source| CodecError::Serialization {
        field: "education",
        source,
    })
}

/// Parses a stored JSON blob back into an education record
///
/// Unknown keys are ignored so rows written by newer versions still decode.
///
/// # Errors
///
/// Returns `CodecError::Decode` naming the `education` field if the blob is
/// not a valid education document
pub fn from_blob(blob: &str) -> CodecResult<Education> {
    serde_json::from_str(blob)
        .map_err(|e| CodecError::decode(UserAttribute::Education, e.to_string()))
}
