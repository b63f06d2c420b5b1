//! Canonical response digest
//!
//! The enclave signs, and every validator re-derives:
//!
//! ```text
//! H = SHA256(txType ‖ encodedArgs ‖ response ‖ k_r1 ‖ k_r2 ‖ … ‖ k_w1 ‖ v_w1 ‖ k_w2 ‖ v_w2 ‖ …)
//! ```
//!
//! with read keys and write keys each sorted lexicographically in their flattened
//! form. The enclave's ECDSA-SHA256 primitive hashes `H` once more, so the value under
//! the signature is `SHA256(H)`.

use crate::crypto::keys::parse_public_key;
use crate::error::Result;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_ASN1};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Read and write set in the order the digest consumes them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalRwSet {
    reads: Vec<Vec<u8>>,
    writes: Vec<(Vec<u8>, Vec<u8>)>,
}

impl CanonicalRwSet {
    /// Builds the canonical form from flattened keys in any order
    ///
    /// Read keys keep duplicates; a later write to the same key replaces an earlier one.
    pub fn new<R, W>(reads: R, writes: W) -> Self
    where
        R: IntoIterator<Item = String>,
        W: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut read_keys: Vec<String> = reads.into_iter().collect();
        read_keys.sort();

        let sorted_writes: BTreeMap<String, Vec<u8>> = writes.into_iter().collect();

        Self {
            reads: read_keys.into_iter().map(String::into_bytes).collect(),
            writes: sorted_writes
                .into_iter()
                .map(|(k, v)| (k.into_bytes(), v))
                .collect(),
        }
    }

    pub fn reads(&self) -> &[Vec<u8>] {
        &self.reads
    }

    pub fn writes(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.writes
    }
}

/// Computes `H`, the value the enclave passes to its signing primitive
pub fn compute_digest(
    tx_type: &[u8],
    encoded_args: &[u8],
    response: &[u8],
    rwset: &CanonicalRwSet,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tx_type);
    hasher.update(encoded_args);
    hasher.update(response);
    for key in rwset.reads() {
        hasher.update(key);
    }
    for (key, value) in rwset.writes() {
        hasher.update(key);
        hasher.update(value);
    }
    hasher.finalize().into()
}

/// Verifies enclave signatures over the canonical digest
pub trait Verifier: Send + Sync {
    /// Returns `Ok(false)` for a well-formed but wrong signature
    fn verify(
        &self,
        tx_type: &[u8],
        encoded_args: &[u8],
        response: &[u8],
        rwset: &CanonicalRwSet,
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool>;
}

/// ECDSA P-256 verifier for DER signatures and DER/PKIX public keys
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaVerifier;

impl Verifier for EcdsaVerifier {
    fn verify(
        &self,
        tx_type: &[u8],
        encoded_args: &[u8],
        response: &[u8],
        rwset: &CanonicalRwSet,
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool> {
        let public_key = parse_public_key(public_key)?;
        let point = public_key.to_encoded_point(false);
        let digest = compute_digest(tx_type, encoded_args, response, rwset);

        // ring hashes the message with SHA-256 before verifying
        let key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, point.as_bytes());
        Ok(key.verify(&digest, signature).is_ok())
    }
}
