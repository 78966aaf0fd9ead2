//! Envelope checksum carried by every chat message.
//!
//! The hash covers sender, recipient, timestamp and project so a receiver can
//! detect a rewritten envelope. It is a plain SHA-256 digest with no secret,
//! so it proves consistency, not authorship.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of `{"sender","recipient","timestamp","projectId"}` serialized
/// as compact JSON in that key order. `timestamp` is milliseconds since the
/// Unix epoch.
pub fn metadata_hash(sender: &str, recipient: &str, timestamp: i64, project_id: &str) -> String {
    // `Value`'s Display writes compact, escaped JSON and cannot fail.
    let envelope = format!(
        r#"{{"sender":{},"recipient":{},"timestamp":{},"projectId":{}}}"#,
        Value::from(sender),
        Value::from(recipient),
        timestamp,
        Value::from(project_id),
    );
    hex::encode(Sha256::digest(envelope.as_bytes()))
}

pub fn verify_metadata_hash(
    hash: &str,
    sender: &str,
    recipient: &str,
    timestamp: i64,
    project_id: &str,
) -> bool {
    metadata_hash(sender, recipient, timestamp, project_id).eq_ignore_ascii_case(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_digest() {
        assert_eq!(
            metadata_hash("u1", "u2", 1_700_000_000_000, "p1"),
            "ebf7c481a3b2110a88157e7f80e4f94d2b2c1854663b5ad79c7fd52c29224bda"
        );
    }

    #[test]
    fn any_envelope_change_breaks_verification() {
        let hash = metadata_hash("u1", "u2", 42, "p1");
        assert!(verify_metadata_hash(&hash, "u1", "u2", 42, "p1"));
        assert!(verify_metadata_hash(&hash.to_uppercase(), "u1", "u2", 42, "p1"));
        assert!(!verify_metadata_hash(&hash, "u3", "u2", 42, "p1"));
        assert!(!verify_metadata_hash(&hash, "u1", "u3", 42, "p1"));
        assert!(!verify_metadata_hash(&hash, "u1", "u2", 43, "p1"));
        assert!(!verify_metadata_hash(&hash, "u1", "u2", 42, "p2"));
    }
}
