//! Attestation conversion and verification
//!
//! An enclave produces an *attestation* of some technology (simulated, EPID, ...).
//! Before it can be registered, the attestation is converted into *evidence* a
//! verifier can check offline (for EPID: a signed report of the attestation service).
//! Both steps dispatch on the `attestation_type` tag of the JSON envelope to handlers
//! registered at bootstrap.

pub mod credentials;
pub mod dispatch;
pub mod epid;
pub mod ias;
pub mod simulation;

pub use credentials::{
    marshal_credentials, unmarshal_attested_data, unmarshal_credentials, CredentialConverter,
    CredentialVerifier,
};
pub use dispatch::{ConverterDispatcher, VerifierDispatcher};
pub use epid::{EpidConverter, EpidVerifier, EPID_LINKABLE_TYPE, EPID_UNLINKABLE_TYPE};
pub use ias::{load_api_key, IasClient, IasReport, IasTransport, ReqwestTransport, DEFAULT_IAS_URL};
pub use simulation::{SimulationConverter, SimulationVerifier, SIMULATED_TYPE};

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Attestation envelope as produced by the enclave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(rename = "attestation_type")]
    pub attestation_type: String,
    #[serde(rename = "attestation")]
    pub data: String,
}

/// Evidence envelope as stored in registered credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "attestation_type")]
    pub attestation_type: String,
    #[serde(rename = "evidence")]
    pub data: String,
}

/// Values an evidence must match to be accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationValues {
    /// Serialized statement whose hash the enclave embedded in its report data
    pub statement: Vec<u8>,
    /// Expected code identity, hex encoded
    pub mrenclave: String,
}

/// Turns attestation bytes of one technology into evidence bytes
pub trait Converter: Send + Sync {
    /// Tag this converter is registered under
    fn attestation_type(&self) -> &str;

    fn convert(&self, attestation: &[u8]) -> Result<Vec<u8>>;
}

/// Checks evidence of one technology against expected values
pub trait EvidenceVerifier: Send + Sync {
    /// Tag this verifier is registered under
    fn attestation_type(&self) -> &str;

    fn verify(&self, evidence: &Evidence, expected: &ValidationValues) -> Result<()>;
}
