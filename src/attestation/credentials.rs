//! Credential-level conversion and verification
//!
//! Credentials travel as base64 text through the ledger's string arguments. The
//! converter unwraps them, turns the embedded attestation into evidence and re-wraps
//! them; the verifier checks the evidence against the attested data they carry.

use crate::attestation::epid::{EpidConverter, EpidVerifier};
use crate::attestation::simulation::{SimulationConverter, SimulationVerifier};
use crate::attestation::{
    Attestation, Converter, ConverterDispatcher, Evidence, EvidenceVerifier, ValidationValues,
    VerifierDispatcher,
};
use crate::error::{Error, Result};
use crate::protos::{AttestedData, Credentials};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message;
use tracing::debug;

/// Decodes base64 credentials; empty input is rejected
pub fn unmarshal_credentials(credentials_base64: &str) -> Result<Credentials> {
    let bytes = BASE64.decode(credentials_base64.trim())?;
    if bytes.is_empty() {
        return Err(Error::Encoding("credential input empty".to_string()));
    }
    Ok(Credentials::decode(bytes.as_slice())?)
}

pub fn marshal_credentials(credentials: &Credentials) -> String {
    BASE64.encode(credentials.encode_to_vec())
}

/// Extracts the attested data carried inside credentials
pub fn unmarshal_attested_data(credentials: &Credentials) -> Result<AttestedData> {
    let any = credentials
        .serialized_attested_data
        .as_ref()
        .ok_or_else(|| Error::Attestation("credentials carry no attested data".to_string()))?;
    Ok(AttestedData::decode(any.value.as_slice())?)
}

/// Converts the attestation inside serialized credentials into evidence
pub struct CredentialConverter {
    dispatcher: ConverterDispatcher,
}

impl CredentialConverter {
    pub fn new<I>(converters: I) -> Result<Self>
    where
        I: IntoIterator<Item = Box<dyn Converter>>,
    {
        let mut dispatcher = ConverterDispatcher::new();
        dispatcher.register(converters)?;
        Ok(Self { dispatcher })
    }

    /// Converter with the built-in simulated and EPID technologies
    pub fn with_defaults() -> Result<Self> {
        Self::new([
            Box::new(SimulationConverter) as Box<dyn Converter>,
            Box::new(EpidConverter::linkable()),
            Box::new(EpidConverter::unlinkable()),
        ])
    }

    /// Takes base64 credentials holding only an attestation and returns them with
    /// evidence added
    pub fn convert_credentials(&self, credentials_base64: &str) -> Result<String> {
        let mut credentials = unmarshal_credentials(credentials_base64)?;

        let attestation: Attestation = serde_json::from_slice(&credentials.attestation)
            .map_err(|e| Error::Attestation(format!("cannot unmarshal attestation json: {}", e)))?;
        let evidence = self.dispatcher.convert(&attestation)?;
        credentials.evidence = serde_json::to_vec(&evidence)?;

        debug!(attestation_type = %evidence.attestation_type, "Converted attestation to evidence");
        Ok(marshal_credentials(&credentials))
    }
}

/// Verifies the evidence inside credentials
pub struct CredentialVerifier {
    dispatcher: VerifierDispatcher,
}

impl CredentialVerifier {
    pub fn new<I>(verifiers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Box<dyn EvidenceVerifier>>,
    {
        let mut dispatcher = VerifierDispatcher::new();
        dispatcher.register(verifiers)?;
        Ok(Self { dispatcher })
    }

    /// Verifier with the built-in technologies; EPID evidence is checked against
    /// `ias_report_signing_key` (PKCS#1 DER), and rejected when none is given
    pub fn with_defaults(ias_report_signing_key: Option<Vec<u8>>) -> Result<Self> {
        Self::new([
            Box::new(SimulationVerifier) as Box<dyn EvidenceVerifier>,
            Box::new(EpidVerifier::linkable(ias_report_signing_key.clone())),
            Box::new(EpidVerifier::unlinkable(ias_report_signing_key)),
        ])
    }

    pub fn verify_credentials(&self, credentials: &Credentials, expected_mrenclave: &str) -> Result<()> {
        let evidence: Evidence = serde_json::from_slice(&credentials.evidence)
            .map_err(|e| Error::Attestation(format!("cannot unmarshal evidence json: {}", e)))?;

        let statement = credentials
            .serialized_attested_data
            .as_ref()
            .map(|any| any.value.clone())
            .ok_or_else(|| Error::Attestation("credentials carry no attested data".to_string()))?;

        let expected = ValidationValues {
            statement,
            mrenclave: expected_mrenclave.to_string(),
        };
        self.dispatcher.verify(&evidence, &expected)
    }
}
