//! Cryptographic primitives shared by the enclave host, clients and validators
//!
//! - **keys**: conversion between the enclave's raw P-256 formats and DER/PKIX/ASN.1
//! - **channel**: ECDH key agreement and AES-128-GCM for encrypted invocations
//! - **digest**: the canonical response digest and its ECDSA verifier

pub mod channel;
pub mod digest;
pub mod keys;

pub use channel::{
    decrypt, derive_shared_key, encrypt, generate_key_pair, ClientSession, NONCE_SIZE,
    SYM_KEY_SIZE, TAG_SIZE,
};
pub use digest::{compute_digest, CanonicalRwSet, EcdsaVerifier, Verifier};
pub use keys::{
    marshal_enclave_pk, marshal_enclave_signature, parse_public_key, unmarshal_ecdsa_signature,
    unmarshal_enclave_pk, PUB_KEY_SIZE, SIGNATURE_SIZE,
};
