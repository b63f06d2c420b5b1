//! Enclave key and signature formats
//!
//! The enclave exchanges P-256 public keys as 64 raw bytes (big-endian X‖Y) and
//! signatures as 64 raw bytes (big-endian R‖S). Everything outside the enclave uses
//! DER: PKIX `SubjectPublicKeyInfo` for keys and ASN.1 `Ecdsa-Sig-Value` for
//! signatures.

use crate::error::{Error, Result};
use p256::ecdsa::Signature;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::PublicKey;

/// Size of a raw enclave public key (X‖Y)
pub const PUB_KEY_SIZE: usize = 64;

/// Size of a raw enclave signature (R‖S)
pub const SIGNATURE_SIZE: usize = 64;

const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

/// Converts a raw enclave public key into DER-encoded PKIX form
///
/// Fails if the input has the wrong size or the point is not on the curve.
pub fn marshal_enclave_pk(raw: &[u8]) -> Result<Vec<u8>> {
    let public_key = public_key_from_raw(raw)?;
    let der = public_key
        .to_public_key_der()
        .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))?;
    Ok(der.as_bytes().to_vec())
}

/// Converts a DER-encoded PKIX public key into the enclave's raw 64-byte format
pub fn unmarshal_enclave_pk(der: &[u8]) -> Result<[u8; PUB_KEY_SIZE]> {
    let public_key = parse_public_key(der)?;
    let point = public_key.to_encoded_point(false);
    let mut raw = [0u8; PUB_KEY_SIZE];
    // skip the SEC1 tag byte
    raw.copy_from_slice(&point.as_bytes()[1..]);
    Ok(raw)
}

/// Parses a DER-encoded PKIX P-256 public key, rejecting off-curve points
pub fn parse_public_key(der: &[u8]) -> Result<PublicKey> {
    PublicKey::from_public_key_der(der)
        .map_err(|e| Error::Crypto(format!("Failed parsing ecdsa public key: {}", e)))
}

/// Converts a raw R‖S enclave signature into ASN.1 DER
///
/// R and S must both be strictly positive.
pub fn marshal_enclave_signature(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.len() != SIGNATURE_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid signature size: expected {} bytes, got {}",
            SIGNATURE_SIZE,
            raw.len()
        )));
    }
    let signature = Signature::from_slice(raw)
        .map_err(|e| Error::Crypto(format!("Invalid enclave signature: {}", e)))?;
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Converts an ASN.1 DER ECDSA signature into the enclave's raw R‖S format
pub fn unmarshal_ecdsa_signature(der: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
    let signature = Signature::from_der(der)
        .map_err(|e| Error::Crypto(format!("Invalid DER signature: {}", e)))?;
    let mut raw = [0u8; SIGNATURE_SIZE];
    raw.copy_from_slice(signature.to_bytes().as_slice());
    Ok(raw)
}

pub(crate) fn public_key_from_raw(raw: &[u8]) -> Result<PublicKey> {
    if raw.len() != PUB_KEY_SIZE {
        return Err(Error::Crypto(format!(
            "Invalid public key size: expected {} bytes, got {}",
            PUB_KEY_SIZE,
            raw.len()
        )));
    }
    let mut sec1 = Vec::with_capacity(PUB_KEY_SIZE + 1);
    sec1.push(SEC1_UNCOMPRESSED_TAG);
    sec1.extend_from_slice(raw);
    PublicKey::from_sec1_bytes(&sec1)
        .map_err(|_| Error::Crypto("Public key is not a valid curve point".to_string()))
}

pub(crate) fn public_key_to_raw(public_key: &PublicKey) -> [u8; PUB_KEY_SIZE] {
    let point = public_key.to_encoded_point(false);
    let mut raw = [0u8; PUB_KEY_SIZE];
    raw.copy_from_slice(&point.as_bytes()[1..]);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::channel::generate_key_pair;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::SigningKey;

    fn random_raw_pk() -> [u8; PUB_KEY_SIZE] {
        let secret = generate_key_pair();
        public_key_to_raw(&secret.public_key())
    }

    #[test]
    fn test_public_key_round_trip() {
        for _ in 0..8 {
            let raw = random_raw_pk();
            let der = marshal_enclave_pk(&raw).expect("Failed to marshal");
            assert_eq!(unmarshal_enclave_pk(&der).expect("Failed to unmarshal"), raw);
        }
    }

    #[test]
    fn test_off_curve_key_rejected() {
        let mut raw = random_raw_pk();
        raw[63] ^= 0x01;
        assert!(marshal_enclave_pk(&raw).is_err());
    }

    #[test]
    fn test_wrong_size_key_rejected() {
        assert!(marshal_enclave_pk(&[4u8; 32]).is_err());
        assert!(unmarshal_enclave_pk(b"not a der key").is_err());
    }

    #[test]
    fn test_signature_round_trip() {
        let signing_key = SigningKey::from(generate_key_pair());
        for message in [&b"a"[..], b"hello", b"another message"] {
            let signature: Signature = signing_key.sign(message);
            let raw = signature.to_bytes();
            let der = marshal_enclave_signature(&raw).expect("Failed to marshal signature");
            let back = unmarshal_ecdsa_signature(&der).expect("Failed to unmarshal signature");
            assert_eq!(back.as_slice(), raw.as_slice());
        }
    }

    #[test]
    fn test_zero_r_or_s_rejected() {
        let mut zero_r = [0u8; SIGNATURE_SIZE];
        zero_r[63] = 1;
        assert!(marshal_enclave_signature(&zero_r).is_err());

        let mut zero_s = [0u8; SIGNATURE_SIZE];
        zero_s[31] = 1;
        assert!(marshal_enclave_signature(&zero_s).is_err());
    }

    #[test]
    fn test_der_signature_with_zero_component_rejected() {
        // SEQUENCE { INTEGER 0, INTEGER 1 }
        let der = [0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x01];
        assert!(unmarshal_ecdsa_signature(&der).is_err());
    }
}
