//! Ledger collaborator interface
//!
//! The enclave host and the chaincode wrapper only need a narrow capability surface
//! from the ledger platform. It is expressed here as the [`LedgerAccessor`] trait;
//! the platform (or [`MemoryLedger`] during development) provides the implementation.

pub mod composite;
pub mod memory;
pub mod trusted;

pub use composite::{
    create_composite_key, is_flat_composite_key, split_flat_composite_key, to_flat_key,
    to_native_key, FLAT_SEPARATOR,
};
pub use memory::MemoryLedger;
pub use trusted::{TrustedLedgerAccessor, TrustedLedgerClient, CMAC_SIZE};

use crate::error::Result;

/// Chaincode response status for success, as used by the ledger platform
pub const STATUS_OK: i32 = 200;

/// Chaincode response status for failure
pub const STATUS_ERROR: i32 = 500;

/// A key/value pair returned by range queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// Response of a chaincode invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChaincodeResponse {
    pub status: i32,
    pub message: String,
    pub payload: Vec<u8>,
}

impl ChaincodeResponse {
    pub fn success(payload: Vec<u8>) -> Self {
        Self {
            status: STATUS_OK,
            message: String::new(),
            payload,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR,
            message: message.into(),
            payload: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Access to ledger state for the duration of one transaction
pub trait LedgerAccessor: Send + Sync {
    /// Returns the value stored under `key`, or an empty vector if absent
    fn get_state(&self, key: &str) -> Result<Vec<u8>>;

    fn put_state(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Returns all entries whose composite key starts with `object_type` and `attributes`
    fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[&str],
    ) -> Result<Vec<KeyValue>>;

    fn invoke_chaincode(&self, name: &str, args: &[Vec<u8>], channel: &str) -> Result<ChaincodeResponse>;

    /// Serialized identity of the transaction submitter
    fn creator(&self) -> Result<Vec<u8>>;

    fn channel_id(&self) -> String;

    /// Invocation arguments, function name first
    fn string_args(&self) -> Vec<String>;
}
