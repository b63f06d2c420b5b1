//! Callback bridge from the enclave to ledger state
//!
//! These functions implement the host side of the enclave's state callbacks over
//! caller-provided, fixed-capacity buffers. They never fail: problems are recorded on
//! the call's context and surfaced once the enclave call returns. A result that does
//! not fit the caller's buffer is reported as zero length, the same as an absent key.
//! Callers inside the enclave cannot tell the two apart.

use crate::enclave::context::{contexts, CallContext, CallbackHandle};
use crate::error::{Error, Result};
use crate::ledger::composite::{split_flat_composite_key, to_flat_key, to_native_key};
use crate::ledger::CMAC_SIZE;
use tracing::{error, info, warn};

/// Reads `key` into `value_out` and the companion's CMAC into `cmac_out`
///
/// Returns the number of bytes written to `value_out`.
pub fn get_state(
    handle: CallbackHandle,
    key: &str,
    value_out: &mut [u8],
    cmac_out: &mut [u8; CMAC_SIZE],
) -> usize {
    with_context(handle, "get_state", |ctx| {
        let (value, cmac) = read_state(ctx, key)?;
        *cmac_out = cmac;
        Ok(copy_bounded(&value, value_out, key))
    })
}

/// Writes `value` under `key`
pub fn put_state(handle: CallbackHandle, key: &str, value: &[u8]) {
    with_context(handle, "put_state", |ctx| {
        let native_key = to_native_key(key)?;
        ctx.ledger.put_state(&native_key, value)?;
        Ok(0)
    });
}

/// Runs a range query over the flattened composite key prefix `composite_key`
///
/// The result is written as a JSON array of `{"key","value"}` objects with flattened
/// keys. Values are embedded verbatim.
pub fn get_state_by_partial_composite_key(
    handle: CallbackHandle,
    composite_key: &str,
    values_out: &mut [u8],
    cmac_out: &mut [u8; CMAC_SIZE],
) -> usize {
    with_context(handle, "get_state_by_partial_composite_key", |ctx| {
        let (values, cmac) = read_range(ctx, composite_key)?;
        *cmac_out = cmac;
        Ok(copy_bounded(&values, values_out, composite_key))
    })
}

/// Fails `callback` for a key the enclave passed that is not valid UTF-8
pub fn reject_key(handle: CallbackHandle, callback: &'static str) {
    with_context(handle, callback, |_| {
        Err(Error::Encoding("key is not valid UTF-8".to_string()))
    });
}

/// Log line emitted by the enclave
pub fn log(message: &str) {
    info!(target: "enclave", "{}", message);
}

fn with_context<F>(handle: CallbackHandle, callback: &'static str, f: F) -> usize
where
    F: FnOnce(&CallContext) -> Result<usize>,
{
    let Some(ctx) = contexts().get(handle) else {
        error!(handle, callback, "No callback context registered for handle");
        return 0;
    };
    match f(&ctx) {
        Ok(written) => written,
        Err(e) => {
            ctx.record_failure(Error::Callback(format!("{} failed: {}", callback, e)));
            0
        }
    }
}

fn copy_bounded(data: &[u8], out: &mut [u8], key: &str) -> usize {
    if data.len() > out.len() {
        warn!(
            key = %key,
            size = data.len(),
            capacity = out.len(),
            "State exceeds callback buffer, returning empty result"
        );
        return 0;
    }
    out[..data.len()].copy_from_slice(data);
    data.len()
}

fn read_state(ctx: &CallContext, key: &str) -> Result<(Vec<u8>, [u8; CMAC_SIZE])> {
    let native_key = to_native_key(key)?;
    let value = ctx.ledger.get_state(&native_key)?;
    let cmac = ctx
        .trusted_ledger
        .verify_state(ctx.ledger.as_ref(), &native_key, None, false)?;
    Ok((value, cmac))
}

fn read_range(ctx: &CallContext, composite_key: &str) -> Result<(Vec<u8>, [u8; CMAC_SIZE])> {
    let parts = split_flat_composite_key(composite_key)?;
    let (object_type, attributes) = parts
        .split_first()
        .ok_or_else(|| Error::Encoding("composite key has no object type".to_string()))?;
    let results = ctx
        .ledger
        .get_state_by_partial_composite_key(object_type, attributes)?;

    let mut buf = Vec::new();
    buf.push(b'[');
    for (i, kv) in results.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        buf.extend_from_slice(b"{\"key\":\"");
        buf.extend_from_slice(to_flat_key(&kv.key).as_bytes());
        buf.extend_from_slice(b"\",\"value\":\"");
        buf.extend_from_slice(&kv.value);
        buf.extend_from_slice(b"\"}");
    }
    buf.push(b']');

    let cmac = ctx
        .trusted_ledger
        .verify_state(ctx.ledger.as_ref(), composite_key, None, true)?;
    Ok((buf, cmac))
}
