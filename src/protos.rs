//! Protobuf messages exchanged with the ledger platform and the enclave registry
//!
//! Credentials and attested data are produced by the enclave host; the read/write set
//! and transaction messages mirror the subset of the ledger's committed transaction
//! format the endorsement validator consumes.

/// Credentials of one enclave instance, transported as base64 text
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Credentials {
    /// Attestation evidence, filled in by the credential converter
    #[prost(bytes = "vec", tag = "1")]
    pub evidence: ::prost::alloc::vec::Vec<u8>,
    /// Serialized [`AttestedData`], the statement the attestation binds
    #[prost(message, optional, tag = "2")]
    pub serialized_attested_data: ::core::option::Option<::prost_types::Any>,
    /// Attestation JSON envelope produced inside the enclave host
    #[prost(bytes = "vec", tag = "3")]
    pub attestation: ::prost::alloc::vec::Vec<u8>,
}

/// Statement bound by an enclave attestation
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttestedData {
    /// DER encoded enclave verification key
    #[prost(bytes = "vec", tag = "1")]
    pub enclave_vk: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "2")]
    pub channel_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub chaincode_id: ::prost::alloc::string::String,
}

/// Type URL used when packing [`AttestedData`] into an `Any`
pub const ATTESTED_DATA_TYPE_URL: &str = "fpc.AttestedData";

/// Read/write set of one transaction, grouped by namespace
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TxReadWriteSet {
    #[prost(int32, tag = "1")]
    pub data_model: i32,
    #[prost(message, repeated, tag = "2")]
    pub ns_rwset: ::prost::alloc::vec::Vec<NsReadWriteSet>,
}

/// Read/write set of a single namespace; `rwset` holds a serialized [`KvRwSet`]
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NsReadWriteSet {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub rwset: ::prost::alloc::vec::Vec<u8>,
}

/// Key/value read/write set
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KvRwSet {
    #[prost(message, repeated, tag = "1")]
    pub reads: ::prost::alloc::vec::Vec<KvRead>,
    #[prost(message, repeated, tag = "2")]
    pub range_queries_info: ::prost::alloc::vec::Vec<RangeQueryInfo>,
    #[prost(message, repeated, tag = "3")]
    pub writes: ::prost::alloc::vec::Vec<KvWrite>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KvRead {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub version: ::core::option::Option<Version>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    #[prost(uint64, tag = "1")]
    pub block_num: u64,
    #[prost(uint64, tag = "2")]
    pub tx_num: u64,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KvWrite {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub is_delete: bool,
    #[prost(bytes = "vec", tag = "3")]
    pub value: ::prost::alloc::vec::Vec<u8>,
}

/// Range query executed during simulation; only raw reads are supported
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RangeQueryInfo {
    #[prost(string, tag = "1")]
    pub start_key: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub end_key: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub itr_exhausted: bool,
    #[prost(message, optional, tag = "4")]
    pub raw_reads: ::core::option::Option<QueryReads>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryReads {
    #[prost(message, repeated, tag = "1")]
    pub kv_reads: ::prost::alloc::vec::Vec<KvRead>,
}

/// Header type of a committed transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HeaderType {
    Message = 0,
    Config = 1,
    ConfigUpdate = 2,
    EndorserTransaction = 3,
}

/// Committed transaction as handed to endorsement validation
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommittedTransaction {
    #[prost(enumeration = "HeaderType", tag = "1")]
    pub header_type: i32,
    #[prost(string, tag = "2")]
    pub channel_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub tx_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub invocation: ::core::option::Option<ChaincodeInvocationSpec>,
    #[prost(message, optional, tag = "5")]
    pub action: ::core::option::Option<ChaincodeAction>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChaincodeInvocationSpec {
    #[prost(string, tag = "1")]
    pub chaincode_id: ::prost::alloc::string::String,
    /// Invocation arguments, function name first
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub args: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

/// Simulation result of a chaincode invocation
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChaincodeAction {
    /// Serialized [`TxReadWriteSet`]
    #[prost(bytes = "vec", tag = "1")]
    pub results: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub response: ::core::option::Option<Response>,
}

#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}
