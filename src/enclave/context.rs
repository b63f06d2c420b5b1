//! Per-call callback contexts
//!
//! While an init or invoke call is inside the enclave, the enclave calls back into the
//! host with an integer handle. The handle resolves to a [`CallContext`] holding the
//! ledger accessors of that call. Handles are tickets from a monotonically increasing
//! counter and are never reused.

use crate::error::Error;
use crate::ledger::{LedgerAccessor, TrustedLedgerAccessor};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Handle identifying one in-flight init/invoke call
pub type CallbackHandle = u64;

static CONTEXTS: LazyLock<ContextRegistry> = LazyLock::new(ContextRegistry::default);

/// The process-wide registry consulted by the callback bridge
pub fn contexts() -> &'static ContextRegistry {
    &CONTEXTS
}

/// Ledger access for the duration of one enclave call
pub struct CallContext {
    pub(crate) ledger: Arc<dyn LedgerAccessor>,
    pub(crate) trusted_ledger: Arc<dyn TrustedLedgerAccessor>,
    failure: Mutex<Option<Error>>,
}

impl CallContext {
    pub fn new(ledger: Arc<dyn LedgerAccessor>, trusted_ledger: Arc<dyn TrustedLedgerAccessor>) -> Self {
        Self {
            ledger,
            trusted_ledger,
            failure: Mutex::new(None),
        }
    }

    /// Records a callback failure; the first one is kept
    pub fn record_failure(&self, error: Error) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            warn!(error = %error, "Callback failed");
            *failure = Some(error);
        }
    }

    pub fn take_failure(&self) -> Option<Error> {
        self.failure.lock().take()
    }
}

/// Ticketed table of active call contexts
#[derive(Default)]
pub struct ContextRegistry {
    next: AtomicU64,
    contexts: RwLock<HashMap<CallbackHandle, Arc<CallContext>>>,
}

impl ContextRegistry {
    /// Registers `context` and returns a guard that releases it when dropped
    pub fn register(&self, context: Arc<CallContext>) -> ContextGuard<'_> {
        let handle = self.next.fetch_add(1, Ordering::Relaxed);
        self.contexts.write().insert(handle, Arc::clone(&context));
        debug!(handle, "Registered callback context");
        ContextGuard {
            registry: self,
            handle,
            context,
        }
    }

    pub fn get(&self, handle: CallbackHandle) -> Option<Arc<CallContext>> {
        self.contexts.read().get(&handle).cloned()
    }

    fn release(&self, handle: CallbackHandle) {
        self.contexts.write().remove(&handle);
        debug!(handle, "Released callback context");
    }

    /// Number of contexts currently registered
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a context registered for as long as it lives
pub struct ContextGuard<'a> {
    registry: &'a ContextRegistry,
    handle: CallbackHandle,
    context: Arc<CallContext>,
}

impl ContextGuard<'_> {
    pub fn handle(&self) -> CallbackHandle {
        self.handle
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(self.handle);
    }
}
