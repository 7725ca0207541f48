use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;

/// Hash algorithm used for every content hash in the chain.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// `prev_hash` carried by the event at sequence 1.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical content the chain hashes for one event.
///
/// `prev_hash` is part of the hashed content so a hash is only ever valid at a
/// single chain position.
pub fn hashable_content(event_type: &str, payload: &Value, prev_hash: &str) -> Value {
    let mut content = Map::new();
    content.insert("event_type".into(), Value::String(event_type.to_owned()));
    content.insert("payload".into(), payload.clone());
    content.insert("prev_hash".into(), Value::String(prev_hash.to_owned()));
    Value::Object(content)
}

/// `content_hash = SHA-256(canonicalize({event_type, payload, prev_hash}))`.
pub fn compute_content_hash(event_type: &str, payload: &Value, prev_hash: &str) -> String {
    let content = hashable_content(event_type, payload, prev_hash);
    sha256_hex(canonicalize(&content).as_bytes())
}

/// The `prev_hash` the next appended event must carry given the current head.
pub fn expected_prev_hash(head_content_hash: Option<&str>) -> &str {
    head_content_hash.unwrap_or(GENESIS_PREV_HASH)
}

/// True for 64 lowercase hex characters.
pub fn is_well_formed_hash(candidate: &str) -> bool {
    candidate.len() == 64
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn genesis_sentinel_is_sixty_four_zeros() {
        assert_eq!(GENESIS_PREV_HASH.len(), 64);
        assert!(GENESIS_PREV_HASH.chars().all(|c| c == '0'));
        assert!(is_well_formed_hash(GENESIS_PREV_HASH));
    }

    #[test]
    fn known_sha256_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_hash_depends_on_chain_position() {
        let payload = json!({"motion": "m-1"});
        let at_genesis = compute_content_hash("motion.introduced", &payload, GENESIS_PREV_HASH);
        let elsewhere = compute_content_hash("motion.introduced", &payload, &"a".repeat(64));
        assert_ne!(at_genesis, elsewhere);
        assert!(is_well_formed_hash(&at_genesis));
    }

    #[test]
    fn content_hash_ignores_key_order() {
        let a = json!({"x": 1, "y": {"b": 2, "a": 1}});
        let b = json!({"y": {"a": 1, "b": 2}, "x": 1});
        assert_eq!(
            compute_content_hash("vote.cast", &a, GENESIS_PREV_HASH),
            compute_content_hash("vote.cast", &b, GENESIS_PREV_HASH)
        );
    }

    #[test]
    fn expected_prev_hash_falls_back_to_genesis() {
        assert_eq!(expected_prev_hash(None), GENESIS_PREV_HASH);
        assert_eq!(expected_prev_hash(Some("abc")), "abc");
    }

    #[test]
    fn malformed_hashes_are_detected() {
        assert!(!is_well_formed_hash("wrong"));
        assert!(!is_well_formed_hash(&"A".repeat(64)));
    }
}
