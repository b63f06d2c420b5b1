//! Software enclave for development and tests
//!
//! Implements the enclave library contract without hardware protection. It hosts a
//! small key/value chaincode (`put`, `get`, `range`), reads and writes state through
//! the callback bridge, honours the secure channel and signs its responses over the
//! canonical digest like the real enclave does.

use crate::attestation::SIMULATED_TYPE;
use crate::config::{MAX_STATE_SIZE, REPORT_SIZE, TARGET_INFO_SIZE};
use crate::crypto::keys::public_key_to_raw;
use crate::crypto::{
    compute_digest, decrypt, derive_shared_key, encrypt, generate_key_pair, parse_public_key,
    CanonicalRwSet, PUB_KEY_SIZE, SIGNATURE_SIZE,
};
use crate::enclave::backend::{
    CallResult, EcallOutput, EnclaveBackend, RawPublicKey, SGX_ERROR_INVALID_ENCLAVE_ID,
    SGX_ERROR_INVALID_PARAMETER, SGX_ERROR_UNEXPECTED, SGX_SUCCESS,
};
use crate::enclave::bridge;
use crate::enclave::context::CallbackHandle;
use crate::ledger::CMAC_SIZE;
use crate::names::{TX_TYPE_INIT, TX_TYPE_INVOKE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::SecretKey;
use parking_lot::RwLock;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const QUOTE_MAGIC: &[u8; 8] = b"SIMQUOTE";

/// Offsets inside the simulated local report, mirroring the SGX report body layout
const REPORT_MRENCLAVE_OFFSET: usize = 64;
const REPORT_DATA_OFFSET: usize = 320;

struct SimState {
    secret: SecretKey,
    mrenclave: [u8; 32],
    companion: Option<(Vec<u8>, RawPublicKey)>,
}

/// Reads and writes observed while running one transaction
#[derive(Default)]
struct SimTransaction {
    reads: Vec<String>,
    writes: Vec<(String, Vec<u8>)>,
}

#[derive(Deserialize)]
struct RangeEntry {
    key: String,
}

/// In-process enclave without hardware isolation
#[derive(Default)]
pub struct SimulatedEnclave {
    state: RwLock<Option<SimState>>,
    call_delay: Option<Duration>,
    active_calls: AtomicUsize,
    peak_calls: AtomicUsize,
}

struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedEnclave {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every init/invoke call take at least `delay`
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Highest number of init/invoke calls observed inside the enclave at once
    pub fn peak_calls(&self) -> usize {
        self.peak_calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveCall<'_> {
        let active = self.active_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_calls.fetch_max(active, Ordering::SeqCst);
        ActiveCall(&self.active_calls)
    }

    fn with_state<T>(&self, f: impl FnOnce(&SimState) -> CallResult<T>) -> CallResult<T> {
        match self.state.read().as_ref() {
            Some(state) => f(state),
            None => Err(SGX_ERROR_INVALID_ENCLAVE_ID),
        }
    }

    fn raw_public_key(state: &SimState) -> RawPublicKey {
        public_key_to_raw(&state.secret.public_key())
    }

    fn quote(state: &SimState, spid: &[u8]) -> Vec<u8> {
        let mut quote = Vec::with_capacity(Self::quote_len(spid.len()));
        quote.extend_from_slice(QUOTE_MAGIC);
        quote.extend_from_slice(&state.mrenclave);
        quote.extend_from_slice(&Self::raw_public_key(state));
        quote.extend_from_slice(spid);
        quote
    }

    fn quote_len(spid_len: usize) -> usize {
        QUOTE_MAGIC.len() + 32 + PUB_KEY_SIZE + spid_len
    }

    fn execute(
        &self,
        tx_type: &str,
        args: &[u8],
        client_pk: Option<&[u8]>,
        response_capacity: usize,
        handle: CallbackHandle,
    ) -> EcallOutput {
        let _active = self.enter();
        if let Some(delay) = self.call_delay {
            std::thread::sleep(delay);
        }

        let (secret, bound) = match self.state.read().as_ref() {
            Some(state) => (state.secret.clone(), state.companion.is_some()),
            None => return failure(SGX_ERROR_INVALID_ENCLAVE_ID, Vec::new()),
        };

        // secure channel: the only argument is the sealed request
        let channel_key = match client_pk {
            Some(der) => match parse_public_key(der) {
                Ok(client_pk) => Some(derive_shared_key(&client_pk, &secret)),
                Err(e) => return failure(SGX_ERROR_INVALID_PARAMETER, e.to_string().into_bytes()),
            },
            None => None,
        };
        let call_args = match decode_args(args, channel_key.as_ref()) {
            Ok(call_args) => call_args,
            Err(message) => return failure(SGX_ERROR_INVALID_PARAMETER, message.into_bytes()),
        };

        let mut tx = SimTransaction::default();
        let result = if tx_type == TX_TYPE_INIT {
            run_init(&call_args, &mut tx, handle)
        } else {
            run_invoke(&call_args, &mut tx, handle, bound)
        };
        let response = match result {
            Ok(response) => response,
            Err(message) => {
                bridge::log(&format!("transaction failed: {}", message));
                return failure(SGX_ERROR_UNEXPECTED, message.into_bytes());
            }
        };

        let response = match &channel_key {
            Some(key) => match encrypt(&response, key) {
                Ok(sealed) => BASE64.encode(sealed).into_bytes(),
                Err(e) => return failure(SGX_ERROR_UNEXPECTED, e.to_string().into_bytes()),
            },
            None => response,
        };
        if response.len() > response_capacity {
            return failure(
                SGX_ERROR_INVALID_PARAMETER,
                response[..response_capacity].to_vec(),
            );
        }

        let rwset = CanonicalRwSet::new(tx.reads, tx.writes);
        let digest = compute_digest(tx_type.as_bytes(), args, &response, &rwset);
        let signature: Signature = SigningKey::from(&secret).sign(&digest);
        let mut raw_signature = [0u8; SIGNATURE_SIZE];
        raw_signature.copy_from_slice(&signature.to_bytes());

        debug!(tx_type, response_len = response.len(), "Simulated enclave signed response");
        EcallOutput {
            status: SGX_SUCCESS,
            response,
            signature: raw_signature,
        }
    }
}

fn failure(status: i32, response: Vec<u8>) -> EcallOutput {
    EcallOutput {
        status,
        response,
        signature: [0u8; SIGNATURE_SIZE],
    }
}

fn decode_args(args: &[u8], channel_key: Option<&[u8; 16]>) -> std::result::Result<Vec<String>, String> {
    let args: Vec<String> =
        serde_json::from_slice(args).map_err(|e| format!("invalid args: {}", e))?;
    let Some(key) = channel_key else {
        return Ok(args);
    };

    let [sealed] = args.as_slice() else {
        return Err(format!("expected one sealed argument, got {}", args.len()));
    };
    let ciphertext = BASE64
        .decode(sealed)
        .map_err(|e| format!("invalid sealed argument: {}", e))?;
    let plaintext = decrypt(&ciphertext, key).map_err(|e| e.to_string())?;
    serde_json::from_slice(&plaintext).map_err(|e| format!("invalid sealed args: {}", e))
}

fn run_init(
    args: &[String],
    tx: &mut SimTransaction,
    handle: CallbackHandle,
) -> std::result::Result<Vec<u8>, String> {
    if args.len() % 2 != 0 {
        return Err("init expects key/value pairs".to_string());
    }
    for pair in args.chunks(2) {
        put(tx, handle, &pair[0], pair[1].as_bytes());
    }
    Ok(b"OK".to_vec())
}

fn run_invoke(
    args: &[String],
    tx: &mut SimTransaction,
    handle: CallbackHandle,
    bound: bool,
) -> std::result::Result<Vec<u8>, String> {
    let (function, params) = args
        .split_first()
        .ok_or_else(|| "no function given".to_string())?;

    match (function.as_str(), params) {
        ("put", [key, value]) => {
            put(tx, handle, key, value.as_bytes());
            Ok(b"OK".to_vec())
        }
        ("get", [key]) => {
            let mut value = vec![0u8; MAX_STATE_SIZE];
            let mut cmac = [0u8; CMAC_SIZE];
            let n = bridge::get_state(handle, key, &mut value, &mut cmac);
            check_cmac(bound, &cmac)?;
            tx.reads.push(key.clone());
            value.truncate(n);
            Ok(value)
        }
        ("range", [object_type, attributes @ ..]) => {
            let mut prefix = format!(".{}.", object_type);
            for attribute in attributes {
                prefix.push_str(attribute);
                prefix.push('.');
            }
            let mut values = vec![0u8; MAX_STATE_SIZE];
            let mut cmac = [0u8; CMAC_SIZE];
            let n = bridge::get_state_by_partial_composite_key(handle, &prefix, &mut values, &mut cmac);
            check_cmac(bound, &cmac)?;
            values.truncate(n);
            if !values.is_empty() {
                let entries: Vec<RangeEntry> = serde_json::from_slice(&values)
                    .map_err(|e| format!("malformed range result: {}", e))?;
                tx.reads.extend(entries.into_iter().map(|entry| entry.key));
            }
            Ok(values)
        }
        (function, _) => Err(format!("unknown function or wrong arguments: {}", function)),
    }
}

fn put(tx: &mut SimTransaction, handle: CallbackHandle, key: &str, value: &[u8]) {
    bridge::put_state(handle, key, value);
    tx.writes.push((key.to_string(), value.to_vec()));
}

fn check_cmac(bound: bool, cmac: &[u8; CMAC_SIZE]) -> std::result::Result<(), String> {
    if bound && cmac.iter().all(|b| *b == 0) {
        return Err("state is not authenticated by the trusted ledger".to_string());
    }
    Ok(())
}

impl EnclaveBackend for SimulatedEnclave {
    fn attestation_type(&self) -> &str {
        SIMULATED_TYPE
    }

    fn create(&self, library_path: &Path) -> CallResult<()> {
        let mut state = self.state.write();
        if state.is_some() {
            return Err(SGX_ERROR_UNEXPECTED);
        }
        let mrenclave: [u8; 32] = Sha256::digest(library_path.to_string_lossy().as_bytes()).into();
        *state = Some(SimState {
            secret: generate_key_pair(),
            mrenclave,
            companion: None,
        });
        info!(library = %library_path.display(), "Simulated enclave created");
        Ok(())
    }

    fn destroy(&self) -> CallResult<()> {
        match self.state.write().take() {
            Some(_) => Ok(()),
            None => Err(SGX_ERROR_INVALID_ENCLAVE_ID),
        }
    }

    fn quote_size(&self, _sig_rl: &[u8]) -> CallResult<usize> {
        Ok(Self::quote_len(crate::config::SPID_SIZE))
    }

    fn remote_attestation_report(
        &self,
        spid: &[u8],
        _sig_rl: &[u8],
        quote_size: usize,
    ) -> CallResult<(Vec<u8>, RawPublicKey)> {
        self.with_state(|state| {
            let quote = Self::quote(state, spid);
            if quote.len() > quote_size {
                return Err(SGX_ERROR_INVALID_PARAMETER);
            }
            Ok((quote, Self::raw_public_key(state)))
        })
    }

    fn local_attestation_report(&self, target_info: &[u8]) -> CallResult<(Vec<u8>, RawPublicKey)> {
        if target_info.len() != TARGET_INFO_SIZE {
            return Err(SGX_ERROR_INVALID_PARAMETER);
        }
        self.with_state(|state| {
            let public_key = Self::raw_public_key(state);
            let mut report = vec![0u8; REPORT_SIZE];
            report[..32].copy_from_slice(&Sha256::digest(target_info));
            report[REPORT_MRENCLAVE_OFFSET..REPORT_MRENCLAVE_OFFSET + 32].copy_from_slice(&state.mrenclave);
            report[REPORT_DATA_OFFSET..REPORT_DATA_OFFSET + 32].copy_from_slice(&Sha256::digest(public_key));
            Ok((report, public_key))
        })
    }

    fn target_info(&self) -> CallResult<Vec<u8>> {
        self.with_state(|state| {
            let mut target_info = vec![0u8; TARGET_INFO_SIZE];
            target_info[..32].copy_from_slice(&state.mrenclave);
            Ok(target_info)
        })
    }

    fn bind(&self, companion: Option<(&[u8], &RawPublicKey)>) -> CallResult<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(SGX_ERROR_INVALID_ENCLAVE_ID)?;
        state.companion = companion.map(|(report, pk)| (report.to_vec(), *pk));
        Ok(())
    }

    fn public_key(&self) -> CallResult<RawPublicKey> {
        self.with_state(|state| Ok(Self::raw_public_key(state)))
    }

    fn init(&self, args: &[u8], response_capacity: usize, handle: CallbackHandle) -> EcallOutput {
        self.execute(TX_TYPE_INIT, args, None, response_capacity, handle)
    }

    fn invoke(
        &self,
        args: &[u8],
        client_pk: Option<&[u8]>,
        response_capacity: usize,
        handle: CallbackHandle,
    ) -> EcallOutput {
        self.execute(TX_TYPE_INVOKE, args, client_pk, response_capacity, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enclave::context::{contexts, CallContext};
    use crate::ledger::{ChaincodeResponse, LedgerAccessor, MemoryLedger, TrustedLedgerClient};
    use std::sync::Arc;

    fn created() -> SimulatedEnclave {
        let enclave = SimulatedEnclave::new();
        enclave.create(Path::new("enclave.signed.so")).unwrap();
        enclave
    }

    fn ledger() -> Arc<MemoryLedger> {
        Arc::new(MemoryLedger::new("mychannel").with_chaincode("tlcc", |_| {
            ChaincodeResponse::success(BASE64.encode([5u8; CMAC_SIZE]).into_bytes())
        }))
    }

    #[test]
    fn test_lifecycle() {
        let enclave = SimulatedEnclave::new();
        assert_eq!(enclave.public_key(), Err(SGX_ERROR_INVALID_ENCLAVE_ID));
        enclave.create(Path::new("lib")).unwrap();
        assert_eq!(enclave.create(Path::new("lib")), Err(SGX_ERROR_UNEXPECTED));

        let size = enclave.quote_size(&[]).unwrap();
        let (quote, pk) = enclave
            .remote_attestation_report(&[0u8; 16], &[], size)
            .unwrap();
        assert_eq!(quote.len(), size);
        assert_eq!(pk, enclave.public_key().unwrap());
        assert_eq!(
            enclave.remote_attestation_report(&[0u8; 16], &[], 4),
            Err(SGX_ERROR_INVALID_PARAMETER)
        );

        enclave.destroy().unwrap();
        assert_eq!(enclave.destroy(), Err(SGX_ERROR_INVALID_ENCLAVE_ID));
    }

    #[test]
    fn test_invoke_put_then_get() {
        let enclave = created();
        let ledger = ledger();
        let guard = contexts().register(Arc::new(CallContext::new(
            ledger.clone(),
            Arc::new(TrustedLedgerClient::default()),
        )));

        let out = enclave.invoke(br#"["put","k","v"]"#, None, 1024, guard.handle());
        assert_eq!(out.status, SGX_SUCCESS);
        assert_eq!(out.response, b"OK");
        assert_eq!(ledger.get_state("k").unwrap(), b"v");

        let out = enclave.invoke(br#"["get","k"]"#, None, 1024, guard.handle());
        assert_eq!(out.status, SGX_SUCCESS);
        assert_eq!(out.response, b"v");
    }

    #[test]
    fn test_unknown_function_returns_partial_response() {
        let enclave = created();
        let guard = contexts().register(Arc::new(CallContext::new(
            ledger(),
            Arc::new(TrustedLedgerClient::default()),
        )));

        let out = enclave.invoke(br#"["burn"]"#, None, 1024, guard.handle());
        assert_eq!(out.status, SGX_ERROR_UNEXPECTED);
        assert!(!out.response.is_empty());
        assert_eq!(out.signature, [0u8; SIGNATURE_SIZE]);

        let out = enclave.invoke(b"not json", None, 1024, guard.handle());
        assert_eq!(out.status, SGX_ERROR_INVALID_PARAMETER);
    }

    #[test]
    fn test_response_larger_than_capacity_is_truncated() {
        let enclave = created();
        let guard = contexts().register(Arc::new(CallContext::new(
            ledger(),
            Arc::new(TrustedLedgerClient::default()),
        )));

        let out = enclave.invoke(br#"["put","k","v"]"#, None, 1, guard.handle());
        assert_eq!(out.status, SGX_ERROR_INVALID_PARAMETER);
        assert_eq!(out.response, b"O");
    }

    #[test]
    fn test_local_report_requires_full_target_info() {
        let enclave = created();
        let target_info = enclave.target_info().unwrap();
        let (report, _) = enclave.local_attestation_report(&target_info).unwrap();
        assert_eq!(report.len(), REPORT_SIZE);
        assert!(enclave.local_attestation_report(&[0u8; 3]).is_err());
    }
}
