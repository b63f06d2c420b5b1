//! Composite key translation
//!
//! The ledger encodes composite keys as `\0type\0attr1\0attr2\0`. Inside the enclave the
//! same key is flattened to `.type.attr1.attr2.`. Keys must be translated at the
//! boundary in both directions, and validators flatten committed keys before
//! re-deriving the digest.

use crate::error::{Error, Result};

/// Separator used by the enclave's flattened key encoding
pub const FLAT_SEPARATOR: char = '.';

const COMPOSITE_KEY_DELIMITER: char = '\u{0}';

/// Builds the ledger's native composite key
pub fn create_composite_key(object_type: &str, attributes: &[&str]) -> String {
    let mut key = String::with_capacity(
        object_type.len() + attributes.iter().map(|a| a.len() + 1).sum::<usize>() + 2,
    );
    key.push(COMPOSITE_KEY_DELIMITER);
    key.push_str(object_type);
    key.push(COMPOSITE_KEY_DELIMITER);
    for attribute in attributes {
        key.push_str(attribute);
        key.push(COMPOSITE_KEY_DELIMITER);
    }
    key
}

/// Whether `key` uses the flattened composite encoding
pub fn is_flat_composite_key(key: &str) -> bool {
    key.len() >= 2 && key.starts_with(FLAT_SEPARATOR) && key.ends_with(FLAT_SEPARATOR)
}

/// Splits a flattened composite key into object type and attributes
pub fn split_flat_composite_key(key: &str) -> Result<Vec<&str>> {
    if !is_flat_composite_key(key) {
        return Err(Error::Encoding(format!(
            "composite key has wrong format: {:?}",
            key
        )));
    }
    let inner = &key[1..key.len() - 1];
    Ok(inner.split(FLAT_SEPARATOR).collect())
}

/// Converts a flattened composite key into the ledger's native encoding
///
/// Keys that are not flattened composite keys pass through unchanged.
pub fn to_native_key(key: &str) -> Result<String> {
    if !is_flat_composite_key(key) {
        return Ok(key.to_string());
    }
    let parts = split_flat_composite_key(key)?;
    let (object_type, attributes) = parts
        .split_first()
        .ok_or_else(|| Error::Encoding("composite key has no object type".to_string()))?;
    Ok(create_composite_key(object_type, attributes))
}

/// Converts a native ledger key into the enclave's flattened encoding
pub fn to_flat_key(key: &str) -> String {
    key.replace(COMPOSITE_KEY_DELIMITER, ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_composite_key() {
        assert_eq!(
            create_composite_key("asset", &["a1", "blue"]),
            "\u{0}asset\u{0}a1\u{0}blue\u{0}"
        );
        assert_eq!(create_composite_key("asset", &[]), "\u{0}asset\u{0}");
    }

    #[test]
    fn test_flat_round_trip() {
        let native = create_composite_key("auction", &["42", "bid"]);
        let flat = to_flat_key(&native);
        assert_eq!(flat, ".auction.42.bid.");
        assert_eq!(to_native_key(&flat).unwrap(), native);
    }

    #[test]
    fn test_plain_keys_pass_through() {
        assert_eq!(to_native_key("balance").unwrap(), "balance");
        assert_eq!(to_flat_key("balance"), "balance");
        assert!(!is_flat_composite_key("."));
        assert!(!is_flat_composite_key("a.b"));
    }

    #[test]
    fn test_split() {
        assert_eq!(
            split_flat_composite_key(".asset.1.").unwrap(),
            vec!["asset", "1"]
        );
        assert!(split_flat_composite_key("asset.1").is_err());
    }
}
