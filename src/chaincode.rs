//! Private chaincode wrapper
//!
//! Routes ledger invocations to the enclave. System functions set up the enclave
//! (`__setup`), expose its key (`__getEnclavePk`) and initialize chaincode state
//! (`__init`); every other function is forwarded to the enclave as an invocation.
//! Results go back to the ledger as [`SignedResponse`] JSON.

use crate::attestation::{marshal_credentials, Attestation, CredentialConverter};
use crate::config::SPID_SIZE;
use crate::enclave::EnclaveStub;
use crate::error::{Error, InvokeError, Result};
use crate::ledger::{ChaincodeResponse, LedgerAccessor, TrustedLedgerAccessor, STATUS_ERROR, STATUS_OK};
use crate::names;
use crate::protos::{AttestedData, Credentials, ATTESTED_DATA_TYPE_URL};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Enclave response with the material a validator needs to check it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedResponse {
    #[serde(rename = "ResponseData", with = "base64_bytes")]
    pub response_data: Vec<u8>,
    /// DER-encoded signature over the canonical digest
    #[serde(rename = "Signature", with = "base64_bytes")]
    pub signature: Vec<u8>,
    /// DER-encoded enclave public key
    #[serde(rename = "PublicKey", with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

/// Byte fields travel as base64 strings, absent ones as `null`
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if bytes.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_str(&BASE64.encode(bytes))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => BASE64.decode(encoded).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

/// Chaincode front end of one enclave
pub struct EnclaveChaincode {
    enclave: EnclaveStub,
    trusted_ledger: Arc<dyn TrustedLedgerAccessor>,
    converter: Arc<CredentialConverter>,
}

impl EnclaveChaincode {
    pub fn new(
        enclave: EnclaveStub,
        trusted_ledger: Arc<dyn TrustedLedgerAccessor>,
        converter: Arc<CredentialConverter>,
    ) -> Self {
        Self {
            enclave,
            trusted_ledger,
            converter,
        }
    }

    pub fn enclave(&self) -> &EnclaveStub {
        &self.enclave
    }

    /// Handles one invocation with the arguments `ledger` carries
    pub async fn handle(&self, ledger: Arc<dyn LedgerAccessor>) -> ChaincodeResponse {
        let args = ledger.string_args();
        let Some(function) = args.first() else {
            return ChaincodeResponse::error("no function given");
        };
        info!(function = %function, "Invoke is running");

        match function.as_str() {
            names::SETUP_FUNCTION => {
                let registry = args
                    .get(1)
                    .map(String::as_str)
                    .unwrap_or(names::REGISTRY_NAMESPACE);
                match self.setup(ledger.as_ref(), registry).await {
                    Ok(public_key) => ChaincodeResponse::success(public_key.into_bytes()),
                    Err(e) => {
                        error!(error = %e, "Enclave setup failed");
                        ChaincodeResponse::error(format!("setup failed: {}", e))
                    }
                }
            }
            names::GET_ENCLAVE_PK_FUNCTION => match self.enclave.public_key().await {
                Ok(public_key) => ChaincodeResponse::success(BASE64.encode(public_key).into_bytes()),
                Err(e) => ChaincodeResponse::error(format!("cannot get enclave public key: {}", e)),
            },
            names::INIT_FUNCTION => match serde_json::to_vec(&args[1..]) {
                Ok(encoded) => {
                    let result = self
                        .enclave
                        .init(&encoded, ledger, Arc::clone(&self.trusted_ledger))
                        .await;
                    self.signed_response(result).await
                }
                Err(e) => ChaincodeResponse::error(e.to_string()),
            },
            _ => match serde_json::to_vec(&args) {
                Ok(encoded) => {
                    let result = self
                        .enclave
                        .invoke(&encoded, None, ledger, Arc::clone(&self.trusted_ledger))
                        .await;
                    self.signed_response(result).await
                }
                Err(e) => ChaincodeResponse::error(e.to_string()),
            },
        }
    }

    async fn signed_response(
        &self,
        result: std::result::Result<crate::enclave::EnclaveResponse, InvokeError>,
    ) -> ChaincodeResponse {
        let public_key = match self.enclave.public_key().await {
            Ok(public_key) => public_key,
            Err(e) => {
                warn!(error = %e, "Cannot attach enclave public key to response");
                Vec::new()
            }
        };

        let (signed, status, message) = match result {
            Ok(out) => (
                SignedResponse {
                    response_data: out.response,
                    signature: out.signature,
                    public_key,
                },
                STATUS_OK,
                String::new(),
            ),
            Err(e) => {
                error!(error = %e.source, "Enclave transaction failed");
                (
                    SignedResponse {
                        response_data: e.response,
                        signature: Vec::new(),
                        public_key,
                    },
                    STATUS_ERROR,
                    format!("enclave transaction failed: {}", e.source),
                )
            }
        };

        match serde_json::to_vec(&signed) {
            Ok(payload) => ChaincodeResponse {
                status,
                message,
                payload,
            },
            Err(e) => ChaincodeResponse::error(e.to_string()),
        }
    }

    /// Creates, attests, registers and binds the enclave; returns its base64 public key
    async fn setup(&self, ledger: &dyn LedgerAccessor, registry: &str) -> Result<String> {
        let mrenclave = self.enclave.mr_enclave()?;
        let recorded = ledger.get_state(names::MRENCLAVE_STATE_KEY)?;
        if recorded.is_empty() {
            ledger.put_state(names::MRENCLAVE_STATE_KEY, mrenclave.as_bytes())?;
        } else if recorded != mrenclave.as_bytes() {
            return Err(Error::Enclave(format!(
                "enclave code identity {} differs from recorded {}",
                mrenclave,
                String::from_utf8_lossy(&recorded)
            )));
        }

        self.enclave
            .create(&self.enclave.config().library_path)
            .await?;

        match self.register_and_bind(ledger, registry, &mrenclave).await {
            Ok(public_key) => Ok(public_key),
            Err(e) => {
                // a later setup must be able to create the enclave again
                if let Err(destroy_err) = self.enclave.destroy().await {
                    warn!(error = %destroy_err, "Cannot destroy enclave after failed setup");
                }
                Err(e)
            }
        }
    }

    async fn register_and_bind(
        &self,
        ledger: &dyn LedgerAccessor,
        registry: &str,
        mrenclave: &str,
    ) -> Result<String> {
        let spid = self.fetch_spid(ledger, registry)?;
        let (quote, public_key) = self.enclave.remote_attestation_report(&spid, &[]).await?;
        info!(mrenclave = %mrenclave, quote_len = quote.len(), "Enclave attested");

        let credentials = self.credentials(ledger, quote, public_key.clone())?;
        let converter = Arc::clone(&self.converter);
        let converted = tokio::task::spawn_blocking(move || converter.convert_credentials(&credentials))
            .await
            .map_err(|e| Error::Attestation(format!("credential conversion did not complete: {}", e)))??;

        let response = ledger.invoke_chaincode(
            registry,
            &[
                names::REGISTRY_REGISTER_ENCLAVE.as_bytes().to_vec(),
                converted.into_bytes(),
            ],
            &ledger.channel_id(),
        )?;
        if !response.is_ok() {
            return Err(Error::Ledger(format!(
                "enclave registration failed: {}",
                response.message
            )));
        }

        let target_info = self.enclave.target_info().await?;
        let (report, companion_pk) = self.trusted_ledger.report(ledger, &target_info)?;
        self.enclave
            .bind(Some((report.as_slice(), companion_pk.as_slice())))
            .await?;

        info!("Enclave registered and bound to trusted ledger");
        Ok(BASE64.encode(public_key))
    }

    fn fetch_spid(&self, ledger: &dyn LedgerAccessor, registry: &str) -> Result<Vec<u8>> {
        let response = ledger.invoke_chaincode(
            registry,
            &[names::REGISTRY_GET_SPID.as_bytes().to_vec()],
            &ledger.channel_id(),
        )?;
        if !response.is_ok() {
            return Err(Error::Ledger(format!("cannot get SPID: {}", response.message)));
        }
        if response.payload.len() != SPID_SIZE {
            return Err(Error::Config(format!(
                "SPID must be {} bytes, got {}",
                SPID_SIZE,
                response.payload.len()
            )));
        }
        Ok(response.payload)
    }

    /// Base64 credentials with the quote as attestation and the enclave key as statement
    fn credentials(&self, ledger: &dyn LedgerAccessor, quote: Vec<u8>, enclave_vk: Vec<u8>) -> Result<String> {
        let attestation = Attestation {
            attestation_type: self.enclave.attestation_type().to_string(),
            data: BASE64.encode(quote),
        };
        let attested_data = AttestedData {
            enclave_vk,
            channel_id: ledger.channel_id(),
            chaincode_id: names::CHAINCODE_NAMESPACE.to_string(),
        };
        let credentials = Credentials {
            evidence: Vec::new(),
            serialized_attested_data: Some(prost_types::Any {
                type_url: ATTESTED_DATA_TYPE_URL.to_string(),
                value: attested_data.encode_to_vec(),
            }),
            attestation: serde_json::to_vec(&attestation)?,
        };
        Ok(marshal_credentials(&credentials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnclaveConfig;
    use crate::enclave::SimulatedEnclave;
    use crate::ledger::{MemoryLedger, TrustedLedgerClient};

    fn chaincode() -> EnclaveChaincode {
        let stub = EnclaveStub::new(Arc::new(SimulatedEnclave::new()), EnclaveConfig::default());
        EnclaveChaincode::new(
            stub,
            Arc::new(TrustedLedgerClient::default()),
            Arc::new(CredentialConverter::with_defaults().unwrap()),
        )
    }

    #[test]
    fn test_signed_response_json() {
        let signed = SignedResponse {
            response_data: b"OK".to_vec(),
            signature: Vec::new(),
            public_key: vec![1, 2, 3],
        };
        let json = serde_json::to_string(&signed).unwrap();
        assert_eq!(json, r#"{"ResponseData":"T0s=","Signature":null,"PublicKey":"AQID"}"#);
        assert_eq!(serde_json::from_str::<SignedResponse>(&json).unwrap(), signed);
    }

    #[tokio::test]
    async fn test_setup_without_mrenclave_file_fails() {
        let ledger = Arc::new(MemoryLedger::new("mychannel").with_args(["__setup", "ercc"]));
        let response = chaincode().handle(ledger).await;
        assert_eq!(response.status, STATUS_ERROR);
        assert!(response.message.starts_with("setup failed"));
    }

    #[tokio::test]
    async fn test_invoke_before_setup_returns_error_status() {
        let ledger = Arc::new(MemoryLedger::new("mychannel").with_args(["put", "k", "v"]));
        let response = chaincode().handle(ledger).await;
        assert_eq!(response.status, STATUS_ERROR);
        let signed: SignedResponse = serde_json::from_slice(&response.payload).unwrap();
        assert!(signed.signature.is_empty());
    }

    #[tokio::test]
    async fn test_no_function() {
        let response = chaincode().handle(Arc::new(MemoryLedger::new("mychannel"))).await;
        assert_eq!(response.status, STATUS_ERROR);
    }
}
