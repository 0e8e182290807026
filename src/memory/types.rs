use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{MemoryError, Result};

/// Open, string-keyed metadata attached to every stored chunk.
///
/// Values are JSON primitives or flat arrays of primitives (tags).
pub type Metadata = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Metadata keys
// ---------------------------------------------------------------------------

/// Creation time of the chunk (RFC 3339). Callers may override it.
pub const KEY_TIMESTAMP: &str = "timestamp";
/// 0-based position of the chunk within its parent text.
pub const KEY_CHUNK_INDEX: &str = "chunk_index";
/// Number of chunks the parent text was split into.
pub const KEY_TOTAL_CHUNKS: &str = "total_chunks";
/// Character length of the parent text before chunking.
pub const KEY_ORIGINAL_LENGTH: &str = "original_length";

/// Keys owned by the store; callers may not supply them.
pub const LINEAGE_KEYS: [&str; 3] = [KEY_CHUNK_INDEX, KEY_TOTAL_CHUNKS, KEY_ORIGINAL_LENGTH];

// ---------------------------------------------------------------------------
// MemoryRecord
// ---------------------------------------------------------------------------

/// A stored chunk as returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Dissimilarity to the query; lower is closer. `None` when the backing
    /// store does not report distances.
    pub distance: Option<f64>,
}

impl MemoryRecord {
    /// The `timestamp` metadata value, if present and a string.
    pub fn timestamp(&self) -> Option<&str> {
        self.metadata.get(KEY_TIMESTAMP).and_then(Value::as_str)
    }

    /// Tags stored under `tags`, whether given as a list or a single string.
    pub fn tags(&self) -> Vec<String> {
        match self.metadata.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn chunk_index(&self) -> Option<u64> {
        self.metadata.get(KEY_CHUNK_INDEX).and_then(Value::as_u64)
    }

    pub fn total_chunks(&self) -> Option<u64> {
        self.metadata.get(KEY_TOTAL_CHUNKS).and_then(Value::as_u64)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check caller-supplied metadata before it is merged into chunk metadata.
///
/// Rejects the store-owned lineage keys and any value that is not a
/// primitive or a flat array of primitives.
pub fn validate_caller_metadata(metadata: &Metadata) -> Result<()> {
    for (key, value) in metadata {
        if LINEAGE_KEYS.contains(&key.as_str()) {
            return Err(MemoryError::InvalidMetadata(format!(
                "`{key}` is reserved and set by the store"
            )));
        }
        let ok = match value {
            Value::Object(_) => false,
            Value::Array(items) => items
                .iter()
                .all(|v| !matches!(v, Value::Object(_) | Value::Array(_))),
            _ => true,
        };
        if !ok {
            return Err(MemoryError::InvalidMetadata(format!(
                "`{key}` must be a primitive or a list of primitives"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_accepts_primitives_and_tag_lists() {
        let m = meta(json!({
            "tags": ["fact", "sky"],
            "source": "cli",
            "rating": 4,
            "pinned": true,
            "note": null,
            "timestamp": "2024-01-01T00:00:00Z"
        }));
        assert!(validate_caller_metadata(&m).is_ok());
    }

    #[test]
    fn test_rejects_lineage_keys() {
        for key in LINEAGE_KEYS {
            let m = meta(json!({ key: 1 }));
            let err = validate_caller_metadata(&m).unwrap_err();
            assert!(matches!(err, MemoryError::InvalidMetadata(_)), "{key}");
        }
    }

    #[test]
    fn test_rejects_nested_values() {
        let m = meta(json!({ "nested": { "a": 1 } }));
        assert!(validate_caller_metadata(&m).is_err());

        let m = meta(json!({ "matrix": [[1, 2], [3, 4]] }));
        assert!(validate_caller_metadata(&m).is_err());
    }

    #[test]
    fn test_record_accessors() {
        let record = MemoryRecord {
            id: "a".into(),
            content: "x".into(),
            metadata: meta(json!({
                "timestamp": "2024-05-01T10:00:00+00:00",
                "chunk_index": 2,
                "total_chunks": 3,
                "tags": ["one", 2]
            })),
            distance: Some(0.1),
        };
        assert_eq!(record.timestamp(), Some("2024-05-01T10:00:00+00:00"));
        assert_eq!(record.chunk_index(), Some(2));
        assert_eq!(record.total_chunks(), Some(3));
        assert_eq!(record.tags(), vec!["one".to_string(), "2".to_string()]);
    }
}
