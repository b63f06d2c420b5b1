//! Private Chaincode - host-side runtime for chaincode executing inside an enclave
//!
//! This library provides:
//! - An enclave runtime stub with bounded admission and a ledger callback bridge
//! - Secure channel cryptography and the canonical response digest
//! - Attestation conversion/verification dispatch (simulated, EPID via IAS)
//! - The enclave registry and endorsement validation of committed transactions

pub mod attestation;
pub mod chaincode;
pub mod config;
pub mod crypto;
pub mod enclave;
pub mod error;
pub mod ledger;
pub mod names;
pub mod protos;
pub mod registry;
pub mod validation;

pub use error::{Error, InvokeError, Result};
