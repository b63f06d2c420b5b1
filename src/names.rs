//! Well-known system function names, namespaces and state keys
//!
//! The chaincode wrapper, the enclave registry and the endorsement validator all
//! branch on these values, so they live in one table.

/// Bootstrap function: creates the enclave and registers it at the registry chaincode.
/// Transactions calling it carry no enclave signature.
pub const SETUP_FUNCTION: &str = "__setup";

/// Chaincode initialization; the marker itself is not part of the signed args.
pub const INIT_FUNCTION: &str = "__init";

/// Returns the enclave public key
pub const GET_ENCLAVE_PK_FUNCTION: &str = "__getEnclavePk";

/// Transaction types mixed into the canonical digest
pub const TX_TYPE_INIT: &str = "init";
pub const TX_TYPE_INVOKE: &str = "invoke";

/// Namespace of the enclave registry chaincode
pub const REGISTRY_NAMESPACE: &str = "ercc";

/// Registry chaincode functions invoked by the setup flow
pub const REGISTRY_GET_SPID: &str = "getSPID";
pub const REGISTRY_REGISTER_ENCLAVE: &str = "registerEnclave";
pub const REGISTRY_GET_ATTESTATION: &str = "getAttestationReport";

/// Name of the trusted ledger companion chaincode
pub const TRUSTED_LEDGER_NAME: &str = "tlcc";

/// Trusted ledger companion functions
pub const TRUSTED_LEDGER_VERIFY_STATE: &str = "VERIFY_STATE";
pub const TRUSTED_LEDGER_GET_REPORT: &str = "GET_LOCAL_ATT_REPORT";

/// Default namespace of the private chaincode itself
pub const CHAINCODE_NAMESPACE: &str = "ecc";

/// State key under which the chaincode records its expected code identity
pub const MRENCLAVE_STATE_KEY: &str = "MRENCLAVE";
