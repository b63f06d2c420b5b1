//! Trusted ledger companion
//!
//! A second enclave tracks the ledger's block sequence independently. For every state
//! read the host forwards to the chaincode enclave, the companion produces a CMAC over
//! the same key, which lets the chaincode enclave detect a host lying about state.

use crate::error::{Error, Result};
use crate::ledger::LedgerAccessor;
use crate::names;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

/// Size of the CMAC produced by the companion
pub const CMAC_SIZE: usize = 16;

/// Verification contract of the trusted ledger companion
pub trait TrustedLedgerAccessor: Send + Sync {
    /// Requests a CMAC for `key` as read through `ledger`
    fn verify_state(
        &self,
        ledger: &dyn LedgerAccessor,
        key: &str,
        nonce: Option<&[u8]>,
        is_range_query: bool,
    ) -> Result<[u8; CMAC_SIZE]>;

    /// Returns a local attestation report (and DER public key) of the companion enclave
    /// addressed to `target_info`
    fn report(&self, ledger: &dyn LedgerAccessor, target_info: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(rename = "Report")]
    report: String,
    #[serde(rename = "EnclavePk")]
    enclave_pk: String,
}

/// Reaches the companion through chaincode-to-chaincode invocation
#[derive(Debug, Clone)]
pub struct TrustedLedgerClient {
    /// Name of the companion chaincode
    chaincode_name: String,
    /// Namespace prefix of the chaincode whose state is verified
    namespace: String,
}

impl Default for TrustedLedgerClient {
    fn default() -> Self {
        Self::new(names::TRUSTED_LEDGER_NAME, names::CHAINCODE_NAMESPACE)
    }
}

impl TrustedLedgerClient {
    pub fn new(chaincode_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            chaincode_name: chaincode_name.into(),
            namespace: namespace.into(),
        }
    }

    /// Key as known to the companion: range query prefixes are already separator
    /// delimited, point keys get one inserted
    fn companion_key(&self, key: &str, is_range_query: bool) -> String {
        if is_range_query {
            format!("{}{}", self.namespace, key)
        } else {
            format!("{}.{}", self.namespace, key)
        }
    }
}

impl TrustedLedgerAccessor for TrustedLedgerClient {
    fn verify_state(
        &self,
        ledger: &dyn LedgerAccessor,
        key: &str,
        nonce: Option<&[u8]>,
        is_range_query: bool,
    ) -> Result<[u8; CMAC_SIZE]> {
        let companion_key = self.companion_key(key, is_range_query);
        let nonce = BASE64.encode(nonce.unwrap_or_default());
        let args = vec![
            names::TRUSTED_LEDGER_VERIFY_STATE.as_bytes().to_vec(),
            companion_key.into_bytes(),
            nonce.into_bytes(),
            is_range_query.to_string().into_bytes(),
        ];

        let response = ledger.invoke_chaincode(&self.chaincode_name, &args, &ledger.channel_id())?;
        if !response.is_ok() {
            return Err(Error::Ledger(format!(
                "Error while performing verify state: {}",
                response.message
            )));
        }

        let cmac = BASE64.decode(&response.payload)?;
        debug!(key = %key, is_range_query, "Received CMAC from trusted ledger");
        cmac.as_slice().try_into().map_err(|_| {
            Error::Ledger(format!(
                "Invalid CMAC size: expected {} bytes, got {}",
                CMAC_SIZE,
                cmac.len()
            ))
        })
    }

    fn report(&self, ledger: &dyn LedgerAccessor, target_info: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let args = vec![
            names::TRUSTED_LEDGER_GET_REPORT.as_bytes().to_vec(),
            target_info.to_vec(),
        ];
        let response = ledger.invoke_chaincode(&self.chaincode_name, &args, &ledger.channel_id())?;
        if !response.is_ok() {
            return Err(Error::Ledger(format!(
                "Cannot get report from trusted ledger: {}",
                response.message
            )));
        }

        let parsed: ReportResponse = serde_json::from_slice(&response.payload)?;
        Ok((BASE64.decode(parsed.report)?, BASE64.decode(parsed.enclave_pk)?))
    }
}
