//! Native enclave backed by the `sgxcc` host library
//!
//! Declares the library's fixed entry points and exports the callbacks it links
//! against. The callback context pointer passed to init/invoke points at the call's
//! [`CallbackHandle`].

use crate::config::{MAX_STATE_SIZE, REPORT_SIZE, TARGET_INFO_SIZE};
use crate::crypto::{PUB_KEY_SIZE, SIGNATURE_SIZE};
use crate::enclave::backend::{
    CallResult, EcallOutput, EnclaveBackend, RawPublicKey, SGX_ERROR_INVALID_ENCLAVE_ID,
    SGX_ERROR_INVALID_PARAMETER, SGX_SUCCESS,
};
use crate::enclave::bridge;
use crate::enclave::context::CallbackHandle;
use crate::ledger::CMAC_SIZE;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::Path;
use std::ptr;
use tracing::{error, info};

type EnclaveId = u64;

#[link(name = "sgxcc")]
extern "C" {
    fn sgxcc_create_enclave(eid: *mut EnclaveId, enclave_file: *const c_char) -> c_int;
    fn sgxcc_destroy_enclave(eid: EnclaveId) -> c_int;
    fn sgxcc_get_quote_size(p_sig_rl: *const u8, sig_rl_size: u32, p_quote_size: *mut u32) -> c_int;
    fn sgxcc_get_remote_attestation_report(
        eid: EnclaveId,
        quote: *mut u8,
        quote_size: u32,
        pubkey: *mut u8,
        spid: *const u8,
        sig_rl: *const u8,
        sig_rl_size: u32,
    ) -> c_int;
    fn sgxcc_get_local_attestation_report(
        eid: EnclaveId,
        target_info: *const u8,
        report: *mut u8,
        pubkey: *mut u8,
    ) -> c_int;
    fn sgxcc_get_target_info(eid: EnclaveId, target_info: *mut u8) -> c_int;
    fn sgxcc_bind(eid: EnclaveId, report: *const u8, pubkey: *const u8) -> c_int;
    fn sgxcc_get_pk(eid: EnclaveId, pubkey: *mut u8) -> c_int;
    fn sgxcc_init(
        eid: EnclaveId,
        args: *const c_char,
        response: *mut u8,
        response_len_in: u32,
        response_len_out: *mut u32,
        signature: *mut u8,
        ctx: *mut c_void,
    ) -> c_int;
    fn sgxcc_invoke(
        eid: EnclaveId,
        args: *const c_char,
        pk: *const c_char,
        response: *mut u8,
        response_len_in: u32,
        response_len_out: *mut u32,
        signature: *mut u8,
        ctx: *mut c_void,
    ) -> c_int;
}

/// Recovers the handle behind a callback context pointer
///
/// # Safety
/// `ctx` must be null or point at a live `CallbackHandle`.
unsafe fn handle_from_ctx(ctx: *mut c_void) -> Option<CallbackHandle> {
    (ctx as *const CallbackHandle).as_ref().copied()
}

/// # Safety
/// `ptr` must be null or a NUL terminated string.
unsafe fn str_from_ptr<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Context handle and decoded key of a state callback
///
/// A key that cannot be decoded fails the call through its context.
///
/// # Safety
/// Same requirements as [`handle_from_ctx`] and [`str_from_ptr`].
unsafe fn callback_args<'a>(
    ctx: *mut c_void,
    key: *const c_char,
    callback: &'static str,
) -> Option<(CallbackHandle, &'a str)> {
    let Some(handle) = handle_from_ctx(ctx) else {
        error!(callback, "Callback invoked without context");
        return None;
    };
    match str_from_ptr(key) {
        Some(key) => Some((handle, key)),
        None => {
            bridge::reject_key(handle, callback);
            None
        }
    }
}

/// # Safety
/// Called by the enclave library with a valid key, `max_val_len` writable bytes at
/// `val`, and `CMAC_SIZE` writable bytes at `cmac`.
#[no_mangle]
pub unsafe extern "C" fn get_state(
    key: *const c_char,
    val: *mut u8,
    max_val_len: u32,
    val_len: *mut u32,
    cmac: *mut u8,
    ctx: *mut c_void,
) {
    *val_len = 0;
    let Some((handle, key)) = callback_args(ctx, key, "get_state") else {
        return;
    };
    let value_out = std::slice::from_raw_parts_mut(val, (max_val_len as usize).min(MAX_STATE_SIZE));
    let mut cmac_out = [0u8; CMAC_SIZE];
    let written = bridge::get_state(handle, key, value_out, &mut cmac_out);
    ptr::copy_nonoverlapping(cmac_out.as_ptr(), cmac, CMAC_SIZE);
    *val_len = written as u32;
}

/// # Safety
/// Called by the enclave library with a valid key and `val_len` readable bytes at `val`.
#[no_mangle]
pub unsafe extern "C" fn put_state(key: *const c_char, val: *const u8, val_len: c_int, ctx: *mut c_void) {
    let Some((handle, key)) = callback_args(ctx, key, "put_state") else {
        return;
    };
    let value: &[u8] = if val.is_null() || val_len <= 0 {
        &[]
    } else {
        std::slice::from_raw_parts(val, val_len as usize)
    };
    bridge::put_state(handle, key, value);
}

/// # Safety
/// Same buffer requirements as [`get_state`].
#[no_mangle]
pub unsafe extern "C" fn get_state_by_partial_composite_key(
    comp_key: *const c_char,
    values: *mut u8,
    max_values_len: u32,
    values_len: *mut u32,
    cmac: *mut u8,
    ctx: *mut c_void,
) {
    *values_len = 0;
    let Some((handle, comp_key)) =
        callback_args(ctx, comp_key, "get_state_by_partial_composite_key")
    else {
        return;
    };
    let values_out =
        std::slice::from_raw_parts_mut(values, (max_values_len as usize).min(MAX_STATE_SIZE));
    let mut cmac_out = [0u8; CMAC_SIZE];
    let written = bridge::get_state_by_partial_composite_key(handle, comp_key, values_out, &mut cmac_out);
    ptr::copy_nonoverlapping(cmac_out.as_ptr(), cmac, CMAC_SIZE);
    *values_len = written as u32;
}

/// # Safety
/// `message` must be null or a NUL terminated string.
#[no_mangle]
pub unsafe extern "C" fn golog(message: *const c_char) {
    if let Some(message) = str_from_ptr(message) {
        bridge::log(message);
    }
}

fn status(ret: c_int) -> CallResult<()> {
    if ret == SGX_SUCCESS {
        Ok(())
    } else {
        Err(ret)
    }
}

/// Transaction entry points sharing one calling convention
#[derive(Clone, Copy)]
enum EntryPoint {
    Init,
    Invoke,
}

/// Enclave instance of the native library
#[derive(Default)]
pub struct NativeEnclave {
    eid: RwLock<Option<EnclaveId>>,
}

impl NativeEnclave {
    pub fn new() -> Self {
        Self::default()
    }

    fn eid(&self) -> CallResult<EnclaveId> {
        (*self.eid.read()).ok_or(SGX_ERROR_INVALID_ENCLAVE_ID)
    }

    fn ecall(
        &self,
        entry: EntryPoint,
        args: &[u8],
        client_pk: Option<&[u8]>,
        response_capacity: usize,
        handle: CallbackHandle,
    ) -> EcallOutput {
        let failed = |status| EcallOutput {
            status,
            response: Vec::new(),
            signature: [0u8; SIGNATURE_SIZE],
        };
        let eid = match self.eid() {
            Ok(eid) => eid,
            Err(status) => return failed(status),
        };
        let Ok(args) = CString::new(args) else {
            return failed(SGX_ERROR_INVALID_PARAMETER);
        };
        // the library takes the client key as base64 text
        let client_pk = match client_pk.map(|pk| CString::new(BASE64.encode(pk))).transpose() {
            Ok(pk) => pk,
            Err(_) => return failed(SGX_ERROR_INVALID_PARAMETER),
        };

        let mut response = vec![0u8; response_capacity];
        let mut response_len: u32 = 0;
        let mut signature = [0u8; SIGNATURE_SIZE];
        let mut handle = handle;
        let ctx = &mut handle as *mut CallbackHandle as *mut c_void;

        let pk_ptr = client_pk.as_ref().map_or(ptr::null(), |pk| pk.as_ptr());
        // SAFETY: all buffers outlive the call and their capacities are passed along
        let ret = unsafe {
            match entry {
                EntryPoint::Init => sgxcc_init(
                    eid,
                    args.as_ptr(),
                    response.as_mut_ptr(),
                    response_capacity as u32,
                    &mut response_len,
                    signature.as_mut_ptr(),
                    ctx,
                ),
                EntryPoint::Invoke => sgxcc_invoke(
                    eid,
                    args.as_ptr(),
                    pk_ptr,
                    response.as_mut_ptr(),
                    response_capacity as u32,
                    &mut response_len,
                    signature.as_mut_ptr(),
                    ctx,
                ),
            }
        };

        response.truncate((response_len as usize).min(response_capacity));
        EcallOutput {
            status: ret,
            response,
            signature,
        }
    }
}

impl EnclaveBackend for NativeEnclave {
    fn attestation_type(&self) -> &str {
        crate::attestation::EPID_LINKABLE_TYPE
    }

    fn create(&self, library_path: &Path) -> CallResult<()> {
        let path = CString::new(library_path.to_string_lossy().as_bytes())
            .map_err(|_| SGX_ERROR_INVALID_PARAMETER)?;
        let mut eid: EnclaveId = 0;
        // SAFETY: `path` is NUL terminated and `eid` is writable
        status(unsafe { sgxcc_create_enclave(&mut eid, path.as_ptr()) })?;
        *self.eid.write() = Some(eid);
        info!(eid, "Enclave created");
        Ok(())
    }

    fn destroy(&self) -> CallResult<()> {
        let eid = self.eid.write().take().ok_or(SGX_ERROR_INVALID_ENCLAVE_ID)?;
        // SAFETY: `eid` was returned by sgxcc_create_enclave
        status(unsafe { sgxcc_destroy_enclave(eid) })
    }

    fn quote_size(&self, sig_rl: &[u8]) -> CallResult<usize> {
        let mut size: u32 = 0;
        let sig_rl_ptr = if sig_rl.is_empty() { ptr::null() } else { sig_rl.as_ptr() };
        // SAFETY: `sig_rl` is readable for its length and `size` is writable
        status(unsafe { sgxcc_get_quote_size(sig_rl_ptr, sig_rl.len() as u32, &mut size) })?;
        Ok(size as usize)
    }

    fn remote_attestation_report(
        &self,
        spid: &[u8],
        sig_rl: &[u8],
        quote_size: usize,
    ) -> CallResult<(Vec<u8>, RawPublicKey)> {
        let eid = self.eid()?;
        let mut quote = vec![0u8; quote_size];
        let mut public_key = [0u8; PUB_KEY_SIZE];
        let sig_rl_ptr = if sig_rl.is_empty() { ptr::null() } else { sig_rl.as_ptr() };
        // SAFETY: output buffers have the sizes the library expects
        status(unsafe {
            sgxcc_get_remote_attestation_report(
                eid,
                quote.as_mut_ptr(),
                quote_size as u32,
                public_key.as_mut_ptr(),
                spid.as_ptr(),
                sig_rl_ptr,
                sig_rl.len() as u32,
            )
        })?;
        Ok((quote, public_key))
    }

    fn local_attestation_report(&self, target_info: &[u8]) -> CallResult<(Vec<u8>, RawPublicKey)> {
        if target_info.len() != TARGET_INFO_SIZE {
            return Err(SGX_ERROR_INVALID_PARAMETER);
        }
        let eid = self.eid()?;
        let mut report = vec![0u8; REPORT_SIZE];
        let mut public_key = [0u8; PUB_KEY_SIZE];
        // SAFETY: target info has the expected size and outputs are writable
        status(unsafe {
            sgxcc_get_local_attestation_report(
                eid,
                target_info.as_ptr(),
                report.as_mut_ptr(),
                public_key.as_mut_ptr(),
            )
        })?;
        Ok((report, public_key))
    }

    fn target_info(&self) -> CallResult<Vec<u8>> {
        let eid = self.eid()?;
        let mut target_info = vec![0u8; TARGET_INFO_SIZE];
        // SAFETY: the buffer has TARGET_INFO_SIZE bytes
        status(unsafe { sgxcc_get_target_info(eid, target_info.as_mut_ptr()) })?;
        Ok(target_info)
    }

    fn bind(&self, companion: Option<(&[u8], &RawPublicKey)>) -> CallResult<()> {
        let eid = self.eid()?;
        let (report, public_key) = match companion {
            Some((report, public_key)) => {
                if report.len() != REPORT_SIZE {
                    return Err(SGX_ERROR_INVALID_PARAMETER);
                }
                (report.as_ptr(), public_key.as_ptr())
            }
            None => (ptr::null(), ptr::null()),
        };
        // SAFETY: pointers are either null (unbind) or valid for the call
        status(unsafe { sgxcc_bind(eid, report, public_key) })
    }

    fn public_key(&self) -> CallResult<RawPublicKey> {
        let eid = self.eid()?;
        let mut public_key = [0u8; PUB_KEY_SIZE];
        // SAFETY: the buffer has PUB_KEY_SIZE bytes
        status(unsafe { sgxcc_get_pk(eid, public_key.as_mut_ptr()) })?;
        Ok(public_key)
    }

    fn init(&self, args: &[u8], response_capacity: usize, handle: CallbackHandle) -> EcallOutput {
        self.ecall(EntryPoint::Init, args, None, response_capacity, handle)
    }

    fn invoke(
        &self,
        args: &[u8],
        client_pk: Option<&[u8]>,
        response_capacity: usize,
        handle: CallbackHandle,
    ) -> EcallOutput {
        self.ecall(EntryPoint::Invoke, args, client_pk, response_capacity, handle)
    }
}
