//! Secure channel between clients and the enclave
//!
//! A client derives a 128-bit key from its own P-256 key and the enclave's public
//! key (ECDH, then the first 16 bytes of SHA-256 over the shared x-coordinate) and
//! uses it with AES-128-GCM. Ciphertexts are laid out as `nonce ‖ tag ‖ ciphertext`.

use crate::crypto::keys::parse_public_key;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::ecdh::diffie_hellman;
use p256::pkcs8::EncodePublicKey;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

/// AES-GCM nonce length
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag length
pub const TAG_SIZE: usize = 16;

/// Symmetric key length (AES-128)
pub const SYM_KEY_SIZE: usize = 16;

/// Generates a fresh P-256 private key
pub fn generate_key_pair() -> SecretKey {
    SecretKey::random(&mut OsRng)
}

/// Derives the shared channel key from a peer public key and our own private key
pub fn derive_shared_key(peer_public_key: &PublicKey, own_private_key: &SecretKey) -> [u8; SYM_KEY_SIZE] {
    let shared = diffie_hellman(own_private_key.to_nonzero_scalar(), peer_public_key.as_affine());
    let digest = Sha256::digest(shared.raw_secret_bytes());
    let mut key = [0u8; SYM_KEY_SIZE];
    key.copy_from_slice(&digest[..SYM_KEY_SIZE]);
    key
}

/// Encrypts `plaintext` under `key` with a fresh random nonce
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let key = aead_key(key)?;

    let mut nonce = [0u8; NONCE_SIZE];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| Error::Crypto("Failed to generate nonce".to_string()))?;

    let mut ciphertext = plaintext.to_vec();
    let tag = key
        .seal_in_place_separate_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut ciphertext)
        .map_err(|_| Error::Crypto("Encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(tag.as_ref());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a `nonce ‖ tag ‖ ciphertext` message produced by [`encrypt`]
pub fn decrypt(input: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if input.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto(format!(
            "Ciphertext too short: {} bytes",
            input.len()
        )));
    }
    let key = aead_key(key)?;

    let (nonce, rest) = input.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    // ring expects the tag appended to the ciphertext
    let mut in_out = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(tag);

    let nonce = Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| Error::Crypto("Invalid nonce".to_string()))?;
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::Crypto("Message authentication failed".to_string()))?;
    Ok(plaintext.to_vec())
}

fn aead_key(key: &[u8]) -> Result<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_128_GCM, key).map_err(|_| {
        Error::Crypto(format!(
            "Invalid key size: expected {} bytes, got {}",
            SYM_KEY_SIZE,
            key.len()
        ))
    })?;
    Ok(LessSafeKey::new(unbound))
}

/// Client side of the secure channel to one enclave
///
/// Requests are sealed as base64 text so they can travel through the ledger's
/// string-typed arguments; responses come back in the same form.
pub struct ClientSession {
    public_key_der: Vec<u8>,
    key: [u8; SYM_KEY_SIZE],
}

impl ClientSession {
    /// Creates a session with a fresh client key pair for the enclave key `enclave_pk_der`
    pub fn new(enclave_pk_der: &[u8]) -> Result<Self> {
        let enclave_pk = parse_public_key(enclave_pk_der)?;
        let secret = generate_key_pair();
        let key = derive_shared_key(&enclave_pk, &secret);
        let public_key_der = secret
            .public_key()
            .to_public_key_der()
            .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))?
            .as_bytes()
            .to_vec();

        Ok(Self { public_key_der, key })
    }

    /// DER-encoded client public key, passed to the enclave alongside the sealed request
    pub fn public_key(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Encrypts serialized request arguments
    pub fn seal_request(&self, request: &[u8]) -> Result<String> {
        Ok(BASE64.encode(encrypt(request, &self.key)?))
    }

    /// Decrypts a response produced by the enclave for this session
    pub fn open_response(&self, response: &[u8]) -> Result<Vec<u8>> {
        let ciphertext = BASE64.decode(response)?;
        decrypt(&ciphertext, &self.key)
    }
}
