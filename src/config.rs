//! Enclave host configuration
//!
//! Boundary sizes are fixed by the enclave library; the paths and the admission slot
//! count can be overridden per deployment.

use std::path::PathBuf;

// =============================================================================
// ENCLAVE BOUNDARY - must match the enclave library build
// =============================================================================

/// Capacity of the response buffer handed to init/invoke
pub const MAX_RESPONSE_SIZE: usize = 1024;

/// Capacity of state values and range query results handed back to the enclave
pub const MAX_STATE_SIZE: usize = 1024;

/// Size of an SGX target info structure
pub const TARGET_INFO_SIZE: usize = 512;

/// Size of an SGX local attestation report
pub const REPORT_SIZE: usize = 432;

/// Size of the service provider id used for EPID quotes
pub const SPID_SIZE: usize = 16;

/// Number of thread control structures, i.e. concurrent calls the enclave admits
pub const ENCLAVE_TCS_NUM: usize = 8;

// =============================================================================
// ARTIFACTS
// =============================================================================

/// Default location of the signed enclave library, relative to the chaincode directory
pub const DEFAULT_ENCLAVE_LIB: &str = "enclave/lib/enclave.signed.so";

/// Default location of the code identity written by the enclave build
pub const DEFAULT_MRENCLAVE_FILE: &str = "enclave/mrenclave";

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Environment variable holding the attestation service API key
pub const IAS_API_KEY_ENV: &str = "IAS_API_KEY";

/// Environment variable naming a directory that contains [`API_KEY_FILE`]
pub const SGX_CREDENTIALS_PATH_ENV: &str = "SGX_CREDENTIALS_PATH";

/// Environment variable naming the project root
pub const FPC_PATH_ENV: &str = "FPC_PATH";

/// Directory below the project root that contains [`API_KEY_FILE`]
pub const FPC_RELATIVE_API_KEY_DIR: &str = "config/ias";

pub const API_KEY_FILE: &str = "api_key.txt";

// =============================================================================

/// Configuration of one enclave host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveConfig {
    /// Path of the signed enclave library
    pub library_path: PathBuf,
    /// Path of the file holding the expected code identity
    pub mrenclave_path: PathBuf,
    /// Number of calls admitted into the enclave at once
    pub tcs_num: usize,
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENCLAVE_LIB, DEFAULT_MRENCLAVE_FILE)
    }
}

impl EnclaveConfig {
    pub fn new(library_path: impl Into<PathBuf>, mrenclave_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            mrenclave_path: mrenclave_path.into(),
            tcs_num: ENCLAVE_TCS_NUM,
        }
    }

    /// Overrides the admission slot count; zero is raised to one
    pub fn with_tcs_num(mut self, tcs_num: usize) -> Self {
        self.tcs_num = tcs_num.max(1);
        self
    }
}
