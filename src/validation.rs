//! Endorsement validation
//!
//! Decides whether a committed private chaincode transaction was really produced by a
//! registered enclave. A transaction passes through
//! extract → canonicalize → lookup trust → verify and ends accepted or rejected.
//! Every rejection is an [`Error::EndorsementPolicy`] and only affects the one
//! transaction.
//!
//! Setup transactions are checked separately by [`RegistrationValidator`], which
//! re-verifies the credentials the registry stored.

use crate::attestation::{unmarshal_attested_data, unmarshal_credentials, CredentialVerifier};
use crate::chaincode::SignedResponse;
use crate::crypto::{CanonicalRwSet, EcdsaVerifier, Verifier};
use crate::error::{Error, Result};
use crate::ledger::to_flat_key;
use crate::names;
use crate::protos::{
    ChaincodeAction, CommittedTransaction, HeaderType, KvRwSet, KvWrite, TxReadWriteSet,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Committed state as seen by one validation pass
pub trait StateSnapshot {
    /// Values of `keys` in `namespace`, empty for absent keys
    fn get_state_multiple_keys(&self, namespace: &str, keys: &[String]) -> Result<Vec<Vec<u8>>>;
}

/// Source of committed state snapshots
pub trait StateFetcher: Send + Sync {
    fn fetch_state(&self) -> Result<Box<dyn StateSnapshot + '_>>;
}

/// Invocation recovered from a committed endorser transaction
struct Decoded {
    tx_id: String,
    channel_id: String,
    chaincode_id: String,
    args: Vec<String>,
    action: Option<ChaincodeAction>,
}

impl Decoded {
    fn function(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    fn take_action(&mut self) -> Result<ChaincodeAction> {
        self.action
            .take()
            .ok_or_else(|| reject("transaction carries no chaincode action"))
    }
}

/// Decodes an endorser transaction with at least a function argument
fn decode_transaction(tx_bytes: &[u8]) -> Result<Decoded> {
    let tx = CommittedTransaction::decode(tx_bytes)?;
    if tx.header_type() != HeaderType::EndorserTransaction {
        return Err(reject(format!(
            "unexpected transaction type {:?}",
            tx.header_type()
        )));
    }
    let invocation = tx
        .invocation
        .ok_or_else(|| reject("transaction carries no chaincode invocation"))?;
    let args = invocation
        .args
        .into_iter()
        .map(|arg| String::from_utf8(arg).map_err(|_| reject("argument is not valid UTF-8")))
        .collect::<Result<Vec<String>>>()?;
    if args.is_empty() {
        return Err(reject("transaction has no function"));
    }

    Ok(Decoded {
        tx_id: tx.tx_id,
        channel_id: tx.channel_id,
        chaincode_id: invocation.chaincode_id,
        args,
        action: tx.action,
    })
}

/// Validates private chaincode endorsements against the enclave registry
pub struct EndorsementValidator {
    state: Arc<dyn StateFetcher>,
    verifier: Box<dyn Verifier>,
}

impl EndorsementValidator {
    pub fn new(state: Arc<dyn StateFetcher>) -> Self {
        Self::with_verifier(state, Box::new(EcdsaVerifier))
    }

    pub fn with_verifier(state: Arc<dyn StateFetcher>, verifier: Box<dyn Verifier>) -> Self {
        Self { state, verifier }
    }

    /// Accepts or rejects one serialized committed transaction
    pub fn validate(&self, tx_bytes: &[u8]) -> Result<()> {
        self.validate_inner(tx_bytes).map_err(into_policy_error)
    }

    fn validate_inner(&self, tx_bytes: &[u8]) -> Result<()> {
        let mut tx = decode_transaction(tx_bytes)?;
        if tx.function() == names::SETUP_FUNCTION {
            info!(tx_id = %tx.tx_id, "Accepting enclave setup transaction");
            return Ok(());
        }

        let action = tx.take_action()?;
        let response = action
            .response
            .ok_or_else(|| reject("chaincode action has no response"))?;
        let signed: SignedResponse = serde_json::from_slice(&response.payload)?;
        let results = TxReadWriteSet::decode(action.results.as_slice())?;

        let (tx_type, encoded_args) = encode_args(&tx.args)?;
        let rwset = canonical_rwset(&results, &tx.chaincode_id)?;
        self.check_registered(&signed.public_key)?;

        let valid = self.verifier.verify(
            tx_type.as_bytes(),
            &encoded_args,
            &signed.response_data,
            &rwset,
            &signed.signature,
            &signed.public_key,
        )?;
        if !valid {
            warn!(tx_id = %tx.tx_id, "Enclave signature does not match transaction");
            return Err(reject("enclave signature verification failed"));
        }

        debug!(tx_id = %tx.tx_id, tx_type, "Endorsement verified");
        Ok(())
    }

    fn check_registered(&self, public_key: &[u8]) -> Result<()> {
        let key = registry_key(public_key);
        let snapshot = self.state.fetch_state()?;
        let values = snapshot.get_state_multiple_keys(names::REGISTRY_NAMESPACE, &[key])?;
        match values.first() {
            Some(value) if !value.is_empty() => Ok(()),
            _ => Err(reject("no attestation found for pk")),
        }
    }
}

/// Re-checks enclave registrations when a setup transaction is committed
///
/// The registry must have received exactly one write: the enclave's credentials,
/// stored under the key derived from the attested enclave key. The credentials are
/// verified again against the code identity of the private chaincode, taken from
/// committed state or, on first setup, from the transaction's own writes.
/// Transactions other than setup pass unchecked.
pub struct RegistrationValidator {
    state: Arc<dyn StateFetcher>,
    verifier: CredentialVerifier,
}

impl RegistrationValidator {
    pub fn new(state: Arc<dyn StateFetcher>, verifier: CredentialVerifier) -> Self {
        Self { state, verifier }
    }

    pub fn validate(&self, tx_bytes: &[u8]) -> Result<()> {
        self.validate_inner(tx_bytes).map_err(into_policy_error)
    }

    fn validate_inner(&self, tx_bytes: &[u8]) -> Result<()> {
        let mut tx = decode_transaction(tx_bytes)?;
        if tx.function() != names::SETUP_FUNCTION {
            debug!(tx_id = %tx.tx_id, "No registration to check");
            return Ok(());
        }
        let registry = tx
            .args
            .get(1)
            .cloned()
            .unwrap_or_else(|| names::REGISTRY_NAMESPACE.to_string());

        let results = TxReadWriteSet::decode(tx.take_action()?.results.as_slice())?;
        let namespaces = results
            .ns_rwset
            .iter()
            .map(|ns| -> Result<(&str, KvRwSet)> {
                Ok((ns.namespace.as_str(), KvRwSet::decode(ns.rwset.as_slice())?))
            })
            .collect::<Result<Vec<(&str, KvRwSet)>>>()?;

        let chaincode_namespace = chaincode_namespace(&namespaces)?;
        let writes: Vec<&KvWrite> = namespaces
            .iter()
            .filter(|(namespace, _)| *namespace == registry)
            .flat_map(|(_, kv)| kv.writes.iter())
            .collect();
        let [write] = writes.as_slice() else {
            return Err(reject(format!(
                "expected one write to {}, found {}",
                registry,
                writes.len()
            )));
        };

        let credentials_base64 = std::str::from_utf8(&write.value)
            .map_err(|_| reject("registered credentials are not valid UTF-8"))?;
        let credentials = unmarshal_credentials(credentials_base64)?;
        let attested_data = unmarshal_attested_data(&credentials)?;
        if write.key != registry_key(&attested_data.enclave_vk) {
            return Err(reject("registry key does not match the attested enclave key"));
        }
        if attested_data.channel_id != tx.channel_id {
            return Err(reject(format!(
                "enclave attested for channel {}, transaction is on {}",
                attested_data.channel_id, tx.channel_id
            )));
        }

        let mrenclave = self.mrenclave(chaincode_namespace, &namespaces)?;
        self.verifier.verify_credentials(&credentials, &mrenclave)?;

        info!(tx_id = %tx.tx_id, enclave = %write.key, mrenclave = %mrenclave, "Enclave registration verified");
        Ok(())
    }

    /// Code identity recorded for `namespace`, committed or written by this transaction
    fn mrenclave(&self, namespace: &str, namespaces: &[(&str, KvRwSet)]) -> Result<String> {
        let snapshot = self.state.fetch_state()?;
        let committed = snapshot
            .get_state_multiple_keys(namespace, &[names::MRENCLAVE_STATE_KEY.to_string()])?
            .into_iter()
            .next()
            .filter(|value| !value.is_empty());

        let value = match committed {
            Some(value) => value,
            None => namespaces
                .iter()
                .filter(|(ns, _)| *ns == namespace)
                .flat_map(|(_, kv)| kv.writes.iter())
                .find(|write| write.key == names::MRENCLAVE_STATE_KEY)
                .map(|write| write.value.clone())
                .ok_or_else(|| {
                    reject(format!(
                        "no MRENCLAVE on the ledger nor in write set for {}",
                        namespace
                    ))
                })?,
        };
        String::from_utf8(value).map_err(|_| reject("MRENCLAVE is not valid UTF-8"))
    }
}

/// The one namespace whose code identity the setup transaction read
fn chaincode_namespace<'a>(namespaces: &[(&'a str, KvRwSet)]) -> Result<&'a str> {
    let mut found = namespaces
        .iter()
        .filter(|(_, kv)| kv.reads.iter().any(|read| read.key == names::MRENCLAVE_STATE_KEY))
        .map(|(namespace, _)| *namespace);
    match (found.next(), found.next()) {
        (Some(namespace), None) => Ok(namespace),
        (Some(_), Some(_)) => Err(reject("multiple namespaces read MRENCLAVE")),
        (None, _) => Err(reject("no chaincode namespace read MRENCLAVE")),
    }
}

fn reject(message: impl Into<String>) -> Error {
    Error::EndorsementPolicy(message.into())
}

fn into_policy_error(e: Error) -> Error {
    match e {
        Error::EndorsementPolicy(_) => e,
        other => Error::EndorsementPolicy(other.to_string()),
    }
}

/// Key under which the registry stores the credentials of the enclave with `public_key`
pub fn registry_key(public_key: &[u8]) -> String {
    BASE64.encode(Sha256::digest(public_key))
}

/// Transaction type and argument encoding as signed by the enclave
fn encode_args(args: &[String]) -> Result<(&'static str, Vec<u8>)> {
    match args.split_first() {
        Some((function, rest)) if function == names::INIT_FUNCTION => {
            Ok((names::TX_TYPE_INIT, serde_json::to_vec(rest)?))
        }
        _ => Ok((names::TX_TYPE_INVOKE, serde_json::to_vec(args)?)),
    }
}

/// Flattened keys the chaincode read and wrote in its own namespace
fn canonical_rwset(rwset: &TxReadWriteSet, namespace: &str) -> Result<CanonicalRwSet> {
    let mut reads = Vec::new();
    let mut writes = Vec::new();

    for ns in rwset.ns_rwset.iter().filter(|ns| ns.namespace == namespace) {
        let kv = KvRwSet::decode(ns.rwset.as_slice())?;
        reads.extend(kv.reads.iter().map(|read| to_flat_key(&read.key)));
        for range in &kv.range_queries_info {
            match &range.raw_reads {
                Some(raw) => reads.extend(raw.kv_reads.iter().map(|read| to_flat_key(&read.key))),
                None => warn!(start_key = %range.start_key, "Range query without raw reads skipped"),
            }
        }
        writes.extend(
            kv.writes
                .into_iter()
                .map(|write| (to_flat_key(&write.key), write.value)),
        );
    }

    Ok(CanonicalRwSet::new(reads, writes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::compute_digest;
    use crate::crypto::{generate_key_pair, marshal_enclave_signature};
    use crate::ledger::memory::TransactionJournal;
    use crate::ledger::MemoryLedger;
    use crate::attestation::epid::testing::{quote_body, report_body, ReportSigner};
    use crate::attestation::{marshal_credentials, Evidence, IasReport};
    use crate::protos::{
        AttestedData, ChaincodeInvocationSpec, Credentials, Response, ATTESTED_DATA_TYPE_URL,
    };
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};
    use p256::pkcs8::EncodePublicKey;
    use p256::SecretKey;

    struct Endorser {
        secret: SecretKey,
        public_key: Vec<u8>,
    }

    impl Endorser {
        fn new() -> Self {
            let secret = generate_key_pair();
            let public_key = secret.public_key().to_public_key_der().unwrap().as_bytes().to_vec();
            Self { secret, public_key }
        }

        fn sign(&self, tx_type: &str, encoded_args: &[u8], response: &[u8], rwset: &CanonicalRwSet) -> Vec<u8> {
            let digest = compute_digest(tx_type.as_bytes(), encoded_args, response, rwset);
            let signature: Signature = SigningKey::from(&self.secret).sign(&digest);
            marshal_enclave_signature(&signature.to_bytes()).unwrap()
        }
    }

    fn transaction(args: &[&str], journal: &TransactionJournal, signed: &SignedResponse) -> Vec<u8> {
        CommittedTransaction {
            header_type: HeaderType::EndorserTransaction as i32,
            channel_id: "mychannel".to_string(),
            tx_id: "tx1".to_string(),
            invocation: Some(ChaincodeInvocationSpec {
                chaincode_id: "ecc".to_string(),
                args: args.iter().map(|a| a.as_bytes().to_vec()).collect(),
            }),
            action: Some(ChaincodeAction {
                results: journal.to_tx_rwset("ecc").encode_to_vec(),
                response: Some(Response {
                    status: 200,
                    message: String::new(),
                    payload: serde_json::to_vec(signed).unwrap(),
                }),
            }),
        }
        .encode_to_vec()
    }

    fn journal() -> TransactionJournal {
        TransactionJournal {
            reads: vec!["\u{0}asset\u{0}1\u{0}".to_string()],
            range_reads: Vec::new(),
            writes: vec![("balance".to_string(), b"10".to_vec())],
        }
    }

    fn setup(endorser: &Endorser, register: bool) -> (EndorsementValidator, SignedResponse) {
        let ledger = Arc::new(MemoryLedger::new("mychannel"));
        if register {
            ledger
                .for_namespace(names::REGISTRY_NAMESPACE)
                .seed(&registry_key(&endorser.public_key), b"credentials");
        }

        let args = ["transfer", "a", "b"];
        let encoded_args = serde_json::to_vec(&args).unwrap();
        let rwset = CanonicalRwSet::new(
            vec![".asset.1.".to_string()],
            vec![("balance".to_string(), b"10".to_vec())],
        );
        let signed = SignedResponse {
            response_data: b"done".to_vec(),
            signature: endorser.sign("invoke", &encoded_args, b"done", &rwset),
            public_key: endorser.public_key.clone(),
        };
        (EndorsementValidator::new(ledger), signed)
    }

    #[test]
    fn test_unmodified_transaction_is_accepted() {
        let endorser = Endorser::new();
        let (validator, signed) = setup(&endorser, true);
        let tx = transaction(&["transfer", "a", "b"], &journal(), &signed);
        validator.validate(&tx).unwrap();
    }

    #[test]
    fn test_altered_write_is_rejected() {
        let endorser = Endorser::new();
        let (validator, signed) = setup(&endorser, true);
        let mut altered = journal();
        altered.writes[0].1 = b"1000".to_vec();

        let err = validator
            .validate(&transaction(&["transfer", "a", "b"], &altered, &signed))
            .unwrap_err();
        assert!(err.is_policy_violation());
    }

    #[test]
    fn test_altered_args_are_rejected() {
        let endorser = Endorser::new();
        let (validator, signed) = setup(&endorser, true);
        let tx = transaction(&["transfer", "a", "c"], &journal(), &signed);
        assert!(validator.validate(&tx).is_err());
    }

    #[test]
    fn test_unregistered_enclave_is_rejected() {
        let endorser = Endorser::new();
        let (validator, signed) = setup(&endorser, false);
        let err = validator
            .validate(&transaction(&["transfer", "a", "b"], &journal(), &signed))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Endorsement policy failure: no attestation found for pk"
        );
    }

    #[test]
    fn test_setup_is_always_accepted() {
        let validator = EndorsementValidator::new(Arc::new(MemoryLedger::new("mychannel")));
        let tx = CommittedTransaction {
            header_type: HeaderType::EndorserTransaction as i32,
            invocation: Some(ChaincodeInvocationSpec {
                chaincode_id: "ecc".to_string(),
                args: vec![b"__setup".to_vec(), b"ercc".to_vec()],
            }),
            ..Default::default()
        };
        validator.validate(&tx.encode_to_vec()).unwrap();
    }

    #[test]
    fn test_non_endorser_transaction_is_rejected() {
        let validator = EndorsementValidator::new(Arc::new(MemoryLedger::new("mychannel")));
        let tx = CommittedTransaction {
            header_type: HeaderType::Config as i32,
            ..Default::default()
        };
        assert!(validator.validate(&tx.encode_to_vec()).unwrap_err().is_policy_violation());
        assert!(validator.validate(b"\xff\xff").unwrap_err().is_policy_violation());
    }

    #[test]
    fn test_init_args_drop_function_name() {
        let args = vec!["__init".to_string(), "k".to_string(), "v".to_string()];
        let (tx_type, encoded) = encode_args(&args).unwrap();
        assert_eq!(tx_type, "init");
        assert_eq!(encoded, br#"["k","v"]"#);

        let (tx_type, encoded) = encode_args(&args[1..]).unwrap();
        assert_eq!(tx_type, "invoke");
        assert_eq!(encoded, br#"["k","v"]"#);
    }

    #[test]
    fn test_only_own_namespace_is_canonicalized() {
        let mut rwset = journal().to_tx_rwset("ecc");
        let other = TransactionJournal {
            writes: vec![("foreign".to_string(), b"x".to_vec())],
            ..Default::default()
        };
        rwset.ns_rwset.extend(other.to_tx_rwset("ercc").ns_rwset);

        let canonical = canonical_rwset(&rwset, "ecc").unwrap();
        assert_eq!(canonical.reads(), &[b".asset.1.".to_vec()]);
        assert_eq!(canonical.writes(), &[(b"balance".to_vec(), b"10".to_vec())]);
    }

    const CODE_IDENTITY: [u8; 32] = [0x3c; 32];

    /// Credentials with report-service evidence for `enclave_vk` on "mychannel"
    fn registration_credentials(signer: &ReportSigner, enclave_vk: &[u8]) -> String {
        let statement = AttestedData {
            enclave_vk: enclave_vk.to_vec(),
            channel_id: "mychannel".to_string(),
            chaincode_id: "ecc".to_string(),
        }
        .encode_to_vec();
        let body = report_body("OK", &quote_body(&CODE_IDENTITY, &statement));
        marshal_credentials(&Credentials {
            evidence: serde_json::to_vec(&signer.evidence(&body)).unwrap(),
            serialized_attested_data: Some(prost_types::Any {
                type_url: ATTESTED_DATA_TYPE_URL.to_string(),
                value: statement,
            }),
            attestation: Vec::new(),
        })
    }

    fn setup_transaction(chaincode: &TransactionJournal, registry: &TransactionJournal) -> Vec<u8> {
        let mut rwset = chaincode.to_tx_rwset("ecc");
        rwset.ns_rwset.extend(registry.to_tx_rwset("ercc").ns_rwset);
        CommittedTransaction {
            header_type: HeaderType::EndorserTransaction as i32,
            channel_id: "mychannel".to_string(),
            tx_id: "setup".to_string(),
            invocation: Some(ChaincodeInvocationSpec {
                chaincode_id: "ecc".to_string(),
                args: vec![b"__setup".to_vec(), b"ercc".to_vec()],
            }),
            action: Some(ChaincodeAction {
                results: rwset.encode_to_vec(),
                response: Some(Response {
                    status: 200,
                    message: String::new(),
                    payload: b"pk".to_vec(),
                }),
            }),
        }
        .encode_to_vec()
    }

    /// First setup: the code identity is read and then recorded
    fn first_setup() -> TransactionJournal {
        TransactionJournal {
            reads: vec!["MRENCLAVE".to_string()],
            range_reads: Vec::new(),
            writes: vec![(
                "MRENCLAVE".to_string(),
                hex::encode(CODE_IDENTITY).into_bytes(),
            )],
        }
    }

    fn registry_writes(writes: &[(&str, &str)]) -> TransactionJournal {
        TransactionJournal {
            writes: writes
                .iter()
                .map(|(key, value)| (key.to_string(), value.as_bytes().to_vec()))
                .collect(),
            ..Default::default()
        }
    }

    fn registration_validator(signer: &ReportSigner, ledger: Arc<MemoryLedger>) -> RegistrationValidator {
        let verifier = CredentialVerifier::with_defaults(Some(signer.public_key())).unwrap();
        RegistrationValidator::new(ledger, verifier)
    }

    #[test]
    fn test_registration_is_accepted() {
        let signer = ReportSigner::new();
        let credentials = registration_credentials(&signer, b"enclave vk");
        let key = registry_key(b"enclave vk");
        let tx = setup_transaction(&first_setup(), &registry_writes(&[(key.as_str(), credentials.as_str())]));

        let validator = registration_validator(&signer, Arc::new(MemoryLedger::new("mychannel")));
        validator.validate(&tx).unwrap();
    }

    #[test]
    fn test_registration_uses_committed_code_identity() {
        let signer = ReportSigner::new();
        let credentials = registration_credentials(&signer, b"enclave vk");
        let key = registry_key(b"enclave vk");
        let reread = TransactionJournal {
            reads: vec!["MRENCLAVE".to_string()],
            ..Default::default()
        };
        let tx = setup_transaction(&reread, &registry_writes(&[(key.as_str(), credentials.as_str())]));

        let ledger = Arc::new(MemoryLedger::new("mychannel"));
        let validator = registration_validator(&signer, Arc::clone(&ledger));
        let err = validator.validate(&tx).unwrap_err();
        assert!(err.to_string().contains("no MRENCLAVE on the ledger"), "{}", err);

        ledger.seed("MRENCLAVE", hex::encode([0x3d; 32]).as_bytes());
        assert!(validator.validate(&tx).unwrap_err().is_policy_violation());

        ledger.seed("MRENCLAVE", hex::encode(CODE_IDENTITY).as_bytes());
        validator.validate(&tx).unwrap();
    }

    #[test]
    fn test_registration_under_foreign_key_is_rejected() {
        let signer = ReportSigner::new();
        let credentials = registration_credentials(&signer, b"enclave vk");
        let key = registry_key(b"other vk");
        let tx = setup_transaction(&first_setup(), &registry_writes(&[(key.as_str(), credentials.as_str())]));

        let validator = registration_validator(&signer, Arc::new(MemoryLedger::new("mychannel")));
        let err = validator.validate(&tx).unwrap_err();
        assert!(err.to_string().contains("registry key does not match"), "{}", err);
    }

    #[test]
    fn test_registration_requires_exactly_one_write() {
        let signer = ReportSigner::new();
        let credentials = registration_credentials(&signer, b"enclave vk");
        let key = registry_key(b"enclave vk");
        let validator = registration_validator(&signer, Arc::new(MemoryLedger::new("mychannel")));

        let two = registry_writes(&[(key.as_str(), credentials.as_str()), ("extra", "x")]);
        let err = validator.validate(&setup_transaction(&first_setup(), &two)).unwrap_err();
        assert!(err.to_string().contains("expected one write to ercc, found 2"), "{}", err);

        let none = registry_writes(&[]);
        let err = validator.validate(&setup_transaction(&first_setup(), &none)).unwrap_err();
        assert!(err.to_string().contains("found 0"), "{}", err);
    }

    #[test]
    fn test_registration_with_altered_evidence_is_rejected() {
        let signer = ReportSigner::new();
        let mut credentials = unmarshal_credentials(&registration_credentials(&signer, b"enclave vk")).unwrap();
        let mut evidence: Evidence = serde_json::from_slice(&credentials.evidence).unwrap();
        let mut report: IasReport = serde_json::from_str(&evidence.data).unwrap();
        report.body = report.body.replace("\"OK\"", "\"GROUP_OUT_OF_DATE\"");
        evidence.data = serde_json::to_string(&report).unwrap();
        credentials.evidence = serde_json::to_vec(&evidence).unwrap();
        let altered = marshal_credentials(&credentials);

        let key = registry_key(b"enclave vk");
        let tx = setup_transaction(&first_setup(), &registry_writes(&[(key.as_str(), altered.as_str())]));
        let validator = registration_validator(&signer, Arc::new(MemoryLedger::new("mychannel")));
        let err = validator.validate(&tx).unwrap_err();
        assert!(err.to_string().contains("invalid report signature"), "{}", err);
    }

    #[test]
    fn test_registration_needs_chaincode_namespace() {
        let signer = ReportSigner::new();
        let credentials = registration_credentials(&signer, b"enclave vk");
        let key = registry_key(b"enclave vk");
        let tx = setup_transaction(
            &TransactionJournal::default(),
            &registry_writes(&[(key.as_str(), credentials.as_str())]),
        );

        let validator = registration_validator(&signer, Arc::new(MemoryLedger::new("mychannel")));
        let err = validator.validate(&tx).unwrap_err();
        assert!(err.to_string().contains("no chaincode namespace read MRENCLAVE"), "{}", err);
    }

    #[test]
    fn test_registration_ignores_other_transactions() {
        let signer = ReportSigner::new();
        let validator = registration_validator(&signer, Arc::new(MemoryLedger::new("mychannel")));
        let tx = transaction(&["transfer", "a", "b"], &journal(), &SignedResponse::default());
        validator.validate(&tx).unwrap();
    }
}
