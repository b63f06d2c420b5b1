//! Error types for the private chaincode core
//!
//! Variants follow the failure classes of the trust model:
//! - transport/encoding failures (base64, protobuf, JSON)
//! - enclave boundary failures (nonzero ECALL return codes)
//! - trust failures (unregistered enclave key, bad signature, failed attestation)
//! - configuration failures (duplicate or unknown attestation types)
//!
//! Nothing in this crate retries; every error is surfaced to the immediate caller.

use thiserror::Error;

/// Errors that can occur in the enclave host, the attestation pipeline or the validator
#[derive(Error, Debug)]
pub enum Error {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Protobuf error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Enclave call {call} failed. Reason: {reason}")]
    EnclaveCall { call: &'static str, reason: i32 },

    #[error("Enclave error: {0}")]
    Enclave(String),

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Attestation error: {0}")]
    Attestation(String),

    #[error("'{0}' type is already registered")]
    AlreadyRegistered(String),

    #[error("'{0}' type is not registered")]
    UnregisteredType(String),

    #[error("Endorsement policy failure: {0}")]
    EndorsementPolicy(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a terminal trust rejection rather than an execution failure
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Error::EndorsementPolicy(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A failed init or invoke call, carrying whatever response the enclave produced
#[derive(Error, Debug)]
#[error("{source}")]
pub struct InvokeError {
    pub response: Vec<u8>,
    #[source]
    pub source: Error,
}

impl From<Error> for InvokeError {
    fn from(source: Error) -> Self {
        Self {
            response: Vec::new(),
            source,
        }
    }
}

impl From<InvokeError> for Error {
    fn from(e: InvokeError) -> Self {
        e.source
    }
}
