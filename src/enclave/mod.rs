//! Enclave runtime stub
//!
//! Wraps an [`EnclaveBackend`] with what the host needs around every boundary call:
//! admission control bounded by the enclave's thread slots, callback context
//! registration for init/invoke, and conversion of keys and signatures from the
//! enclave's raw formats to DER.
//!
//! Calls into the enclave are not interruptible. Each one runs on a blocking thread
//! and holds an admission permit for its whole duration.

pub mod backend;
pub mod bridge;
pub mod context;
#[cfg(feature = "sgx")]
pub mod ffi;
pub mod simulated;

pub use backend::{CallResult, EcallOutput, EnclaveBackend, RawPublicKey};
pub use context::{contexts, CallContext, CallbackHandle};
#[cfg(feature = "sgx")]
pub use ffi::NativeEnclave;
pub use simulated::SimulatedEnclave;

use crate::config::{EnclaveConfig, MAX_RESPONSE_SIZE};
use crate::crypto::{marshal_enclave_pk, marshal_enclave_signature, unmarshal_enclave_pk};
use crate::error::{Error, InvokeError, Result};
use crate::ledger::{LedgerAccessor, TrustedLedgerAccessor};
use backend::SGX_SUCCESS;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Response of a successful init or invoke call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveResponse {
    pub response: Vec<u8>,
    /// DER-encoded ECDSA signature over the canonical digest
    pub signature: Vec<u8>,
}

/// Host-side handle to one enclave instance
pub struct EnclaveStub {
    backend: Arc<dyn EnclaveBackend>,
    slots: Arc<Semaphore>,
    created: AtomicBool,
    config: EnclaveConfig,
}

impl EnclaveStub {
    pub fn new(backend: Arc<dyn EnclaveBackend>, config: EnclaveConfig) -> Self {
        info!(
            tcs_num = config.tcs_num,
            attestation_type = backend.attestation_type(),
            "Enclave stub ready"
        );
        Self {
            backend,
            slots: Arc::new(Semaphore::new(config.tcs_num)),
            created: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &EnclaveConfig {
        &self.config
    }

    /// Attestation technology of the underlying enclave
    pub fn attestation_type(&self) -> &str {
        self.backend.attestation_type()
    }

    /// Runs `f` against the backend on a blocking thread once a slot is free
    async fn run_ecall<T, F>(&self, call: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EnclaveBackend) -> T + Send + 'static,
    {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| Error::Enclave(format!("{} not admitted: enclave is shut down", call)))?;
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|e| Error::Enclave(format!("{} did not complete: {}", call, e)))
    }

    fn check(call: &'static str, result: CallResult<()>) -> Result<()> {
        result.map_err(|reason| {
            error!(call, reason, "Enclave call failed");
            Error::EnclaveCall { call, reason }
        })
    }

    /// Loads the enclave library; may only succeed once per stub
    pub async fn create(&self, library_path: impl AsRef<Path>) -> Result<()> {
        if self.created.swap(true, Ordering::SeqCst) {
            return Err(Error::Enclave("enclave already created".to_string()));
        }
        let library_path: PathBuf = library_path.as_ref().to_path_buf();
        info!(library = %library_path.display(), "Creating enclave");

        let result = self
            .run_ecall("sgxcc_create_enclave", move |backend| backend.create(&library_path))
            .await
            .and_then(|result| Self::check("sgxcc_create_enclave", result));
        if result.is_err() {
            self.created.store(false, Ordering::SeqCst);
        }
        result
    }

    pub async fn target_info(&self) -> Result<Vec<u8>> {
        self.run_ecall("sgxcc_get_target_info", |backend| backend.target_info())
            .await?
            .map_err(|reason| Error::EnclaveCall {
                call: "sgxcc_get_target_info",
                reason,
            })
    }

    /// Returns a local report for `target_info` and the enclave's DER public key
    pub async fn local_attestation_report(&self, target_info: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let target_info = target_info.to_vec();
        let (report, raw_pk) = self
            .run_ecall("sgxcc_get_local_attestation_report", move |backend| {
                backend.local_attestation_report(&target_info)
            })
            .await?
            .map_err(|reason| Error::EnclaveCall {
                call: "sgxcc_get_local_attestation_report",
                reason,
            })?;
        Ok((report, marshal_enclave_pk(&raw_pk)?))
    }

    /// Returns a quote linked to `spid` and the enclave's DER public key
    pub async fn remote_attestation_report(&self, spid: &[u8], sig_rl: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let spid = spid.to_vec();
        let sig_rl = sig_rl.to_vec();
        let (quote, raw_pk) = self
            .run_ecall("sgxcc_get_remote_attestation_report", move |backend| {
                let quote_size = backend.quote_size(&sig_rl)?;
                backend.remote_attestation_report(&spid, &sig_rl, quote_size)
            })
            .await?
            .map_err(|reason| Error::EnclaveCall {
                call: "sgxcc_get_remote_attestation_report",
                reason,
            })?;
        debug!(quote_len = quote.len(), "Received quote from enclave");
        Ok((quote, marshal_enclave_pk(&raw_pk)?))
    }

    /// Binds the enclave to the trusted ledger companion behind `report` and its DER
    /// public key, or unbinds it for `None`
    pub async fn bind(&self, companion: Option<(&[u8], &[u8])>) -> Result<()> {
        let companion = match companion {
            Some((report, pk_der)) => Some((report.to_vec(), unmarshal_enclave_pk(pk_der)?)),
            None => None,
        };
        let result = self
            .run_ecall("sgxcc_bind", move |backend| {
                backend.bind(companion.as_ref().map(|(report, pk)| (report.as_slice(), pk)))
            })
            .await?;
        Self::check("sgxcc_bind", result)
    }

    pub async fn init(
        &self,
        args: &[u8],
        ledger: Arc<dyn LedgerAccessor>,
        trusted_ledger: Arc<dyn TrustedLedgerAccessor>,
    ) -> std::result::Result<EnclaveResponse, InvokeError> {
        let args = args.to_vec();
        self.transact("sgxcc_init", ledger, trusted_ledger, move |backend, handle| {
            backend.init(&args, MAX_RESPONSE_SIZE, handle)
        })
        .await
    }

    /// Invokes the enclave; `client_pk` is the DER public key of a secure channel client
    pub async fn invoke(
        &self,
        args: &[u8],
        client_pk: Option<Vec<u8>>,
        ledger: Arc<dyn LedgerAccessor>,
        trusted_ledger: Arc<dyn TrustedLedgerAccessor>,
    ) -> std::result::Result<EnclaveResponse, InvokeError> {
        let args = args.to_vec();
        self.transact("sgxcc_invoke", ledger, trusted_ledger, move |backend, handle| {
            backend.invoke(&args, client_pk.as_deref(), MAX_RESPONSE_SIZE, handle)
        })
        .await
    }

    async fn transact<F>(
        &self,
        call: &'static str,
        ledger: Arc<dyn LedgerAccessor>,
        trusted_ledger: Arc<dyn TrustedLedgerAccessor>,
        f: F,
    ) -> std::result::Result<EnclaveResponse, InvokeError>
    where
        F: FnOnce(&dyn EnclaveBackend, CallbackHandle) -> EcallOutput + Send + 'static,
    {
        // the guard travels with the call and releases the handle however it ends
        let guard = contexts().register(Arc::new(CallContext::new(ledger, trusted_ledger)));
        let (output, failure) = self
            .run_ecall(call, move |backend| {
                let output = f(backend, guard.handle());
                (output, guard.context().take_failure())
            })
            .await?;

        if output.status != SGX_SUCCESS {
            warn!(call, status = output.status, "Enclave transaction failed");
            return Err(InvokeError {
                response: output.response,
                source: Error::EnclaveCall {
                    call,
                    reason: output.status,
                },
            });
        }
        if let Some(failure) = failure {
            return Err(InvokeError {
                response: output.response,
                source: failure,
            });
        }

        let signature = marshal_enclave_signature(&output.signature).map_err(|e| InvokeError {
            response: output.response.clone(),
            source: e,
        })?;
        Ok(EnclaveResponse {
            response: output.response,
            signature,
        })
    }

    /// DER-encoded public key of the enclave
    pub async fn public_key(&self) -> Result<Vec<u8>> {
        let raw_pk = self
            .run_ecall("sgxcc_get_pk", |backend| backend.public_key())
            .await?
            .map_err(|reason| Error::EnclaveCall {
                call: "sgxcc_get_pk",
                reason,
            })?;
        marshal_enclave_pk(&raw_pk)
    }

    pub async fn destroy(&self) -> Result<()> {
        let result = self
            .run_ecall("sgxcc_destroy_enclave", |backend| backend.destroy())
            .await?;
        Self::check("sgxcc_destroy_enclave", result)?;
        self.created.store(false, Ordering::SeqCst);
        info!("Enclave destroyed");
        Ok(())
    }

    /// Code identity of the enclave as recorded by its build
    pub fn mr_enclave(&self) -> Result<String> {
        read_mrenclave(&self.config.mrenclave_path)
    }
}

/// Reads a code identity file; a missing or blank file is an error
pub fn read_mrenclave(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read MRENCLAVE from {}: {}", path.display(), e))
    })?;
    let mrenclave = contents.trim();
    if mrenclave.is_empty() {
        return Err(Error::Config(format!("MRENCLAVE file {} is empty", path.display())));
    }
    Ok(mrenclave.to_string())
}
