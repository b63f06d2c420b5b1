//! In-memory ledger used for development and tests
//!
//! State is kept per namespace in ordered maps shared between views created with
//! [`MemoryLedger::for_namespace`]. Every access through a view is journaled the way
//! the ledger platform records a transaction simulation, so the journal can be
//! turned into the read/write set a validator would see after commit.

use crate::error::{Error, Result};
use crate::ledger::composite::create_composite_key;
use crate::ledger::{ChaincodeResponse, KeyValue, LedgerAccessor};
use crate::names;
use crate::protos::{KvRead, KvRwSet, KvWrite, NsReadWriteSet, QueryReads, RangeQueryInfo, TxReadWriteSet};
use crate::validation::{StateFetcher, StateSnapshot};
use parking_lot::{Mutex, RwLock};
use prost::Message;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Largest code point, used as the exclusive end key of prefix range queries
const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

type ChaincodeHandler = Arc<dyn Fn(&[Vec<u8>]) -> ChaincodeResponse + Send + Sync>;

/// Namespace → key → value
pub type NamespacedState = HashMap<String, BTreeMap<String, Vec<u8>>>;

/// Range query observed during simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRead {
    pub start_key: String,
    pub end_key: String,
    pub keys: Vec<String>,
}

/// Accesses recorded while a transaction was simulated, in native key form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionJournal {
    pub reads: Vec<String>,
    pub range_reads: Vec<RangeRead>,
    pub writes: Vec<(String, Vec<u8>)>,
}

impl TransactionJournal {
    /// Key/value read/write set of a single namespace
    pub fn to_kv_rwset(&self) -> KvRwSet {
        KvRwSet {
            reads: self
                .reads
                .iter()
                .map(|key| KvRead {
                    key: key.clone(),
                    version: None,
                })
                .collect(),
            range_queries_info: self
                .range_reads
                .iter()
                .map(|range| RangeQueryInfo {
                    start_key: range.start_key.clone(),
                    end_key: range.end_key.clone(),
                    itr_exhausted: true,
                    raw_reads: Some(QueryReads {
                        kv_reads: range
                            .keys
                            .iter()
                            .map(|key| KvRead {
                                key: key.clone(),
                                version: None,
                            })
                            .collect(),
                    }),
                })
                .collect(),
            writes: self
                .writes
                .iter()
                .map(|(key, value)| KvWrite {
                    key: key.clone(),
                    is_delete: false,
                    value: value.clone(),
                })
                .collect(),
        }
    }

    /// Transaction read/write set with this journal as the only namespace
    pub fn to_tx_rwset(&self, namespace: &str) -> TxReadWriteSet {
        TxReadWriteSet {
            data_model: 0,
            ns_rwset: vec![NsReadWriteSet {
                namespace: namespace.to_string(),
                rwset: self.to_kv_rwset().encode_to_vec(),
            }],
        }
    }
}

/// In-memory implementation of [`LedgerAccessor`]
pub struct MemoryLedger {
    channel_id: String,
    namespace: String,
    state: Arc<RwLock<NamespacedState>>,
    chaincodes: HashMap<String, ChaincodeHandler>,
    args: Vec<String>,
    creator: Vec<u8>,
    journal: Mutex<TransactionJournal>,
}

impl MemoryLedger {
    /// Creates an empty ledger serving the private chaincode namespace
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            namespace: names::CHAINCODE_NAMESPACE.to_string(),
            state: Arc::new(RwLock::new(HashMap::new())),
            chaincodes: HashMap::new(),
            args: Vec::new(),
            creator: Vec::new(),
            journal: Mutex::new(TransactionJournal::default()),
        }
    }

    /// Registers a handler answering chaincode-to-chaincode invocations of `name`
    pub fn with_chaincode<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[Vec<u8>]) -> ChaincodeResponse + Send + Sync + 'static,
    {
        self.chaincodes.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_creator(mut self, creator: impl Into<Vec<u8>>) -> Self {
        self.creator = creator.into();
        self
    }

    /// A view on another namespace sharing this ledger's state
    ///
    /// The view has its own journal, no arguments and no chaincode handlers.
    pub fn for_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            channel_id: self.channel_id.clone(),
            namespace: namespace.into(),
            state: Arc::clone(&self.state),
            chaincodes: HashMap::new(),
            args: Vec::new(),
            creator: self.creator.clone(),
            journal: Mutex::new(TransactionJournal::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Replaces the invocation arguments for the next transaction
    pub fn set_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
    }

    /// Writes directly into this view's namespace without journaling
    pub fn seed(&self, key: &str, value: &[u8]) {
        self.state
            .write()
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), value.to_vec());
    }

    /// Returns and clears the accesses recorded since the last call
    pub fn take_journal(&self) -> TransactionJournal {
        std::mem::take(&mut *self.journal.lock())
    }

    /// Copy of the state of every namespace
    pub fn snapshot(&self) -> NamespacedState {
        self.state.read().clone()
    }
}

impl LedgerAccessor for MemoryLedger {
    fn get_state(&self, key: &str) -> Result<Vec<u8>> {
        let value = self
            .state
            .read()
            .get(&self.namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
            .unwrap_or_default();
        self.journal.lock().reads.push(key.to_string());
        Ok(value)
    }

    fn put_state(&self, key: &str, value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::Ledger("key must not be an empty string".to_string()));
        }
        self.state
            .write()
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        self.journal
            .lock()
            .writes
            .push((key.to_string(), value.to_vec()));
        Ok(())
    }

    fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[&str],
    ) -> Result<Vec<KeyValue>> {
        let start_key = create_composite_key(object_type, attributes);
        let mut end_key = start_key.clone();
        end_key.push(MAX_UNICODE_RUNE);

        let results: Vec<KeyValue> = self
            .state
            .read()
            .get(&self.namespace)
            .map(|ns| {
                ns.range(start_key.clone()..end_key.clone())
                    .map(|(key, value)| KeyValue {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(object_type, matches = results.len(), "Range query over partial composite key");
        self.journal.lock().range_reads.push(RangeRead {
            start_key,
            end_key,
            keys: results.iter().map(|kv| kv.key.clone()).collect(),
        });
        Ok(results)
    }

    fn invoke_chaincode(&self, name: &str, args: &[Vec<u8>], channel: &str) -> Result<ChaincodeResponse> {
        if channel != self.channel_id {
            return Err(Error::Ledger(format!(
                "cannot invoke chaincode {} on unknown channel {}",
                name, channel
            )));
        }
        let handler = self
            .chaincodes
            .get(name)
            .ok_or_else(|| Error::Ledger(format!("chaincode {} is not installed", name)))?;
        Ok(handler(args))
    }

    fn creator(&self) -> Result<Vec<u8>> {
        Ok(self.creator.clone())
    }

    fn channel_id(&self) -> String {
        self.channel_id.clone()
    }

    fn string_args(&self) -> Vec<String> {
        self.args.clone()
    }
}

impl StateSnapshot for NamespacedState {
    fn get_state_multiple_keys(&self, namespace: &str, keys: &[String]) -> Result<Vec<Vec<u8>>> {
        let ns = self.get(namespace);
        Ok(keys
            .iter()
            .map(|key| ns.and_then(|ns| ns.get(key)).cloned().unwrap_or_default())
            .collect())
    }
}

/// Validators see the committed state of every namespace
impl StateFetcher for MemoryLedger {
    fn fetch_state(&self) -> Result<Box<dyn StateSnapshot + '_>> {
        Ok(Box::new(self.snapshot()))
    }
}
