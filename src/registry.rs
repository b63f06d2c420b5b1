//! Enclave registry
//!
//! Keeps the verified credentials of every enclave allowed to endorse private
//! chaincode transactions, keyed by `base64(SHA256(enclave public key))`. This is the
//! key the endorsement validator looks up.

use crate::attestation::{unmarshal_attested_data, unmarshal_credentials, CredentialVerifier};
use crate::error::{Error, Result};
use crate::ledger::{ChaincodeResponse, LedgerAccessor};
use crate::names;
use crate::validation::registry_key;
use tracing::{debug, info, warn};

/// Registry chaincode logic
pub struct EnclaveRegistry {
    verifier: CredentialVerifier,
    spid: Vec<u8>,
    /// Code identity enclaves must attest to, hex encoded
    approved_mrenclave: String,
}

impl EnclaveRegistry {
    pub fn new(verifier: CredentialVerifier, spid: Vec<u8>, approved_mrenclave: impl Into<String>) -> Self {
        Self {
            verifier,
            spid,
            approved_mrenclave: approved_mrenclave.into(),
        }
    }

    /// Verifies `credentials_base64` and records them; returns the registry key
    pub fn register_enclave(
        &self,
        ledger: &dyn LedgerAccessor,
        credentials_base64: &str,
        expected_mrenclave: &str,
    ) -> Result<String> {
        let credentials = unmarshal_credentials(credentials_base64)?;
        self.verifier
            .verify_credentials(&credentials, expected_mrenclave)?;

        let attested_data = unmarshal_attested_data(&credentials)?;
        if attested_data.channel_id != ledger.channel_id() {
            return Err(Error::Attestation(format!(
                "enclave attested for channel {}, registry runs on {}",
                attested_data.channel_id,
                ledger.channel_id()
            )));
        }
        if attested_data.enclave_vk.is_empty() {
            return Err(Error::Attestation("attested data carries no enclave key".to_string()));
        }

        let key = registry_key(&attested_data.enclave_vk);
        if !ledger.get_state(&key)?.is_empty() {
            return Err(Error::Ledger(format!("enclave {} is already registered", key)));
        }
        ledger.put_state(&key, credentials_base64.trim().as_bytes())?;

        info!(
            enclave = %key,
            chaincode_id = %attested_data.chaincode_id,
            "Enclave registered"
        );
        Ok(key)
    }

    /// Stored credentials of the enclave registered under `key`
    pub fn get_attestation(&self, ledger: &dyn LedgerAccessor, key: &str) -> Result<Vec<u8>> {
        let credentials = ledger.get_state(key)?;
        if credentials.is_empty() {
            return Err(Error::Ledger(format!("enclave {} does not exist", key)));
        }
        Ok(credentials)
    }

    /// Handles one registry invocation, function name first
    pub fn handle(&self, ledger: &dyn LedgerAccessor, args: &[Vec<u8>]) -> ChaincodeResponse {
        let args: Vec<String> = args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        let Some((function, params)) = args.split_first() else {
            return ChaincodeResponse::error("no function given");
        };
        debug!(function = %function, params = params.len(), "Registry invoked");

        let result = match (function.as_str(), params) {
            (names::REGISTRY_REGISTER_ENCLAVE, [credentials]) => self
                .register_enclave(ledger, credentials, &self.approved_mrenclave)
                .map(String::into_bytes),
            (names::REGISTRY_GET_SPID, []) => Ok(self.spid.clone()),
            (names::REGISTRY_GET_ATTESTATION, [key]) => self.get_attestation(ledger, key),
            (function, _) => Err(Error::Ledger(format!(
                "Received unknown function invocation: {}",
                function
            ))),
        };

        match result {
            Ok(payload) => ChaincodeResponse::success(payload),
            Err(e) => {
                warn!(function = %function, error = %e, "Registry invocation failed");
                ChaincodeResponse::error(e.to_string())
            }
        }
    }
}
