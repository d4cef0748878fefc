use serde::Serialize;

use crate::hasher::HasherError;

/// Deterministic JSON encoding used for every content hash.
///
/// The value is first lowered to a `serde_json::Value`, whose object maps
/// are ordered by key, so keys come out sorted at every depth regardless of
/// field or insertion order. Output is compact (no whitespace).
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HasherError> {
    let value =
        serde_json::to_value(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
    serde_json::to_vec(&value).map_err(|e| HasherError::Serialization(e.to_string()))
}
