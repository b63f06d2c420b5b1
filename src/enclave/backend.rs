//! Enclave library contract
//!
//! One method per entry point of the enclave library. Keys, signatures and boundary
//! buffers are in the enclave's raw formats; conversion to DER happens in the stub.
//! Failures are the library's numeric status codes.

use crate::crypto::{PUB_KEY_SIZE, SIGNATURE_SIZE};
use crate::enclave::context::CallbackHandle;
use std::path::Path;

/// Status code of a successful call
pub const SGX_SUCCESS: i32 = 0;

/// Generic failure
pub const SGX_ERROR_UNEXPECTED: i32 = 0x0001;

/// A parameter, such as a buffer size, was rejected
pub const SGX_ERROR_INVALID_PARAMETER: i32 = 0x0002;

/// The enclave was used before it was created or after it was destroyed
pub const SGX_ERROR_INVALID_ENCLAVE_ID: i32 = 0x2002;

/// Result of a boundary call: the value or the library's status code
pub type CallResult<T> = std::result::Result<T, i32>;

/// Output of an init or invoke call
///
/// The response holds whatever the enclave wrote, also on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcallOutput {
    pub status: i32,
    pub response: Vec<u8>,
    pub signature: [u8; SIGNATURE_SIZE],
}

/// Raw enclave public key (X‖Y)
pub type RawPublicKey = [u8; PUB_KEY_SIZE];

/// Entry points of an enclave library instance
///
/// All methods block until the enclave returns. `init` and `invoke` may call back
/// into [`crate::enclave::bridge`] with `handle` while they run.
pub trait EnclaveBackend: Send + Sync {
    /// Attestation technology of the quotes this backend produces
    fn attestation_type(&self) -> &str;

    fn create(&self, library_path: &Path) -> CallResult<()>;

    fn destroy(&self) -> CallResult<()>;

    fn quote_size(&self, sig_rl: &[u8]) -> CallResult<usize>;

    /// Produces a quote of at most `quote_size` bytes bound to the enclave key
    fn remote_attestation_report(
        &self,
        spid: &[u8],
        sig_rl: &[u8],
        quote_size: usize,
    ) -> CallResult<(Vec<u8>, RawPublicKey)>;

    fn local_attestation_report(&self, target_info: &[u8]) -> CallResult<(Vec<u8>, RawPublicKey)>;

    fn target_info(&self) -> CallResult<Vec<u8>>;

    /// Trusts the companion enclave behind `report`/`public_key`, or nobody for `None`
    fn bind(&self, companion: Option<(&[u8], &RawPublicKey)>) -> CallResult<()>;

    fn public_key(&self) -> CallResult<RawPublicKey>;

    fn init(&self, args: &[u8], response_capacity: usize, handle: CallbackHandle) -> EcallOutput;

    /// `client_pk` is the DER public key of a client using the secure channel
    fn invoke(
        &self,
        args: &[u8],
        client_pk: Option<&[u8]>,
        response_capacity: usize,
        handle: CallbackHandle,
    ) -> EcallOutput;
}
