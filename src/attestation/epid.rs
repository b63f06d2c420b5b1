//! EPID attestation handlers
//!
//! Conversion forwards the quote to the attestation service. Verification checks the
//! service's report offline: the report signature, the quote status and the quote
//! body, whose report data must commit to the attested statement.

use crate::attestation::ias::{load_api_key, IasClient, IasReport};
use crate::attestation::{Converter, Evidence, EvidenceVerifier, ValidationValues};
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::signature::{UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub const EPID_LINKABLE_TYPE: &str = "epid-linkable";
pub const EPID_UNLINKABLE_TYPE: &str = "epid-unlinkable";

/// Size of the quote body embedded in a report (quote without signature)
const QUOTE_BODY_SIZE: usize = 432;

/// Offset of MRENCLAVE within the quote body (report body at 48, field at 64)
const MRENCLAVE_OFFSET: usize = 112;
const MRENCLAVE_SIZE: usize = 32;

/// Offset of the report data within the quote body (report body at 48, field at 320)
const REPORT_DATA_OFFSET: usize = 368;
const REPORT_DATA_SIZE: usize = 64;

/// Quote statuses accepted besides `OK`
const ACCEPTED_QUOTE_STATUSES: &[&str] = &[
    "OK",
    "GROUP_OUT_OF_DATE",
    "CONFIGURATION_NEEDED",
    "SW_HARDENING_NEEDED",
    "CONFIGURATION_AND_SW_HARDENING_NEEDED",
];

/// Converts EPID quotes into signed attestation service reports
pub struct EpidConverter {
    attestation_type: &'static str,
    client: Option<IasClient>,
}

impl EpidConverter {
    /// Converter that loads the API key from the environment on every conversion
    pub fn linkable() -> Self {
        Self {
            attestation_type: EPID_LINKABLE_TYPE,
            client: None,
        }
    }

    pub fn unlinkable() -> Self {
        Self {
            attestation_type: EPID_UNLINKABLE_TYPE,
            client: None,
        }
    }

    /// Uses a preconfigured client instead of loading the API key
    pub fn with_client(mut self, client: IasClient) -> Self {
        self.client = Some(client);
        self
    }
}

impl Converter for EpidConverter {
    fn attestation_type(&self) -> &str {
        self.attestation_type
    }

    fn convert(&self, attestation: &[u8]) -> Result<Vec<u8>> {
        let quote = std::str::from_utf8(attestation)
            .map_err(|e| Error::Encoding(format!("quote is not valid UTF-8: {}", e)))?;

        let report = match &self.client {
            Some(client) => client.request_attestation_report(quote),
            None => {
                let api_key = load_api_key()
                    .map_err(|e| Error::Attestation(format!("cannot load IAS API key: {}", e)))?;
                IasClient::new(api_key).request_attestation_report(quote)
            }
        }
        .map_err(|e| Error::Attestation(format!("cannot convert epid attestation: {}", e)))?;

        Ok(report.into_bytes())
    }
}

#[derive(Debug, Deserialize)]
struct ReportBody {
    #[serde(rename = "isvEnclaveQuoteStatus", alias = "ISVEnclaveQuoteStatus")]
    quote_status: String,
    #[serde(rename = "isvEnclaveQuoteBody", alias = "ISVEnclaveQuoteBody")]
    quote_body: String,
}

/// Verifies attestation service reports offline
///
/// The report signature is checked against a configured RSA public key (PKCS#1 DER)
/// of the report signing certificate. The certificates carried in the evidence are
/// not evaluated.
pub struct EpidVerifier {
    attestation_type: &'static str,
    report_signing_key: Option<Vec<u8>>,
}

impl EpidVerifier {
    pub fn linkable(report_signing_key: Option<Vec<u8>>) -> Self {
        Self {
            attestation_type: EPID_LINKABLE_TYPE,
            report_signing_key,
        }
    }

    pub fn unlinkable(report_signing_key: Option<Vec<u8>>) -> Self {
        Self {
            attestation_type: EPID_UNLINKABLE_TYPE,
            report_signing_key,
        }
    }

    fn verify_signature(&self, report: &IasReport) -> Result<()> {
        let key = self.report_signing_key.as_deref().ok_or_else(|| {
            Error::Attestation("no IAS report signing key configured".to_string())
        })?;
        let signature = BASE64.decode(report.signature.trim())?;
        UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, key)
            .verify(report.body.as_bytes(), &signature)
            .map_err(|_| Error::Attestation("invalid report signature".to_string()))
    }
}

impl EvidenceVerifier for EpidVerifier {
    fn attestation_type(&self) -> &str {
        self.attestation_type
    }

    fn verify(&self, evidence: &Evidence, expected: &ValidationValues) -> Result<()> {
        let report: IasReport = serde_json::from_str(&evidence.data)
            .map_err(|e| Error::Attestation(format!("bad ias evidence json: {}", e)))?;
        if report.signature.is_empty() || report.certificates.is_empty() || report.body.is_empty() {
            return Err(Error::Attestation("incomplete ias evidence".to_string()));
        }

        self.verify_signature(&report)?;
        check_report_body(&report.body, expected)
    }
}

/// Checks quote status, code identity and report data of a report body
pub(crate) fn check_report_body(body: &str, expected: &ValidationValues) -> Result<()> {
    let body: ReportBody = serde_json::from_str(body)
        .map_err(|e| Error::Attestation(format!("bad ias json report: {}", e)))?;

    if !ACCEPTED_QUOTE_STATUSES.contains(&body.quote_status.as_str()) {
        warn!(status = %body.quote_status, "Rejecting quote status");
        return Err(Error::Attestation(format!(
            "invalid quote status: {}",
            body.quote_status
        )));
    }

    let quote = BASE64.decode(&body.quote_body)?;
    if quote.len() != QUOTE_BODY_SIZE {
        return Err(Error::Attestation(format!(
            "unexpected quote size: {}",
            quote.len()
        )));
    }

    let mrenclave = hex::encode(&quote[MRENCLAVE_OFFSET..MRENCLAVE_OFFSET + MRENCLAVE_SIZE]);
    debug!(found = %mrenclave, expected = %expected.mrenclave, "Comparing code identity");
    if !mrenclave.eq_ignore_ascii_case(expected.mrenclave.trim()) {
        return Err(Error::Attestation("expected code id mismatch".to_string()));
    }

    // report data is SHA256(statement) padded with zeros
    let mut expected_report_data = [0u8; REPORT_DATA_SIZE];
    expected_report_data[..32].copy_from_slice(&Sha256::digest(&expected.statement));
    if quote[REPORT_DATA_OFFSET..REPORT_DATA_OFFSET + REPORT_DATA_SIZE] != expected_report_data {
        return Err(Error::Attestation("expected statement mismatch".to_string()));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::{quote_body, report_body, ReportSigner};
    use super::*;
    use crate::attestation::ias::{IasHttpResponse, IasTransport};

    fn expected(mrenclave: &[u8; 32], statement: &[u8]) -> ValidationValues {
        ValidationValues {
            statement: statement.to_vec(),
            mrenclave: hex::encode_upper(mrenclave),
        }
    }

    #[test]
    fn test_report_body_accepted() {
        let mrenclave = [0xab; 32];
        let body = report_body("GROUP_OUT_OF_DATE", &quote_body(&mrenclave, b"statement"));
        check_report_body(&body, &expected(&mrenclave, b"statement")).unwrap();
    }

    #[test]
    fn test_report_body_rejections() {
        let mrenclave = [0xab; 32];
        let quote = quote_body(&mrenclave, b"statement");

        let revoked = report_body("KEY_REVOKED", &quote);
        assert!(check_report_body(&revoked, &expected(&mrenclave, b"statement")).is_err());

        let body = report_body("OK", &quote);
        assert!(check_report_body(&body, &expected(&[0xcd; 32], b"statement")).is_err());
        assert!(check_report_body(&body, &expected(&mrenclave, b"other statement")).is_err());

        let short = report_body("OK", &BASE64.encode([0u8; 16]));
        assert!(check_report_body(&short, &expected(&mrenclave, b"statement")).is_err());
    }

    #[test]
    fn test_verifier_requires_signing_key_and_valid_signature() {
        let mrenclave = [0xab; 32];
        let report = IasReport {
            signature: BASE64.encode([1u8; 256]),
            certificates: "cert".to_string(),
            body: report_body("OK", &quote_body(&mrenclave, b"statement")),
        };
        let evidence = Evidence {
            attestation_type: EPID_LINKABLE_TYPE.to_string(),
            data: serde_json::to_string(&report).unwrap(),
        };

        let without_key = EpidVerifier::linkable(None);
        assert!(without_key
            .verify(&evidence, &expected(&mrenclave, b"statement"))
            .is_err());

        let with_garbage_key = EpidVerifier::linkable(Some(vec![0x30, 0x00]));
        assert!(with_garbage_key
            .verify(&evidence, &expected(&mrenclave, b"statement"))
            .is_err());
    }

    #[test]
    fn test_verifier_accepts_signed_report() {
        let signer = ReportSigner::new();
        let verifier = EpidVerifier::linkable(Some(signer.public_key()));
        let mrenclave = [0x5a; 32];
        let body = report_body("OK", &quote_body(&mrenclave, b"enclave vk"));

        verifier
            .verify(&signer.evidence(&body), &expected(&mrenclave, b"enclave vk"))
            .unwrap();

        // wrong identity or statement under a valid signature
        assert!(verifier
            .verify(&signer.evidence(&body), &expected(&[0x5b; 32], b"enclave vk"))
            .is_err());
        assert!(verifier
            .verify(&signer.evidence(&body), &expected(&mrenclave, b"other vk"))
            .is_err());
    }

    #[test]
    fn test_verifier_rejects_modified_report() {
        let signer = ReportSigner::new();
        let verifier = EpidVerifier::linkable(Some(signer.public_key()));
        let mrenclave = [0x5a; 32];
        let body = report_body("OK", &quote_body(&mrenclave, b"enclave vk"));

        let mut evidence = signer.evidence(&body);
        let mut report: IasReport = serde_json::from_str(&evidence.data).unwrap();
        // "id":"1" becomes "id":"2"
        report.body = report.body.replacen("\"1\"", "\"2\"", 1);
        assert_ne!(report.body, body);
        evidence.data = serde_json::to_string(&report).unwrap();

        let err = verifier
            .verify(&evidence, &expected(&mrenclave, b"enclave vk"))
            .unwrap_err();
        assert!(err.to_string().contains("invalid report signature"));
    }

    struct FixedTransport;

    impl IasTransport for FixedTransport {
        fn post_json(&self, _url: &str, _api_key: &str, _body: Vec<u8>) -> Result<IasHttpResponse> {
            Ok(IasHttpResponse {
                status: 200,
                request_id: None,
                signature: Some("c2ln".to_string()),
                certificates: Some("certs".to_string()),
                body: "report".to_string(),
            })
        }
    }

    #[test]
    fn test_converter_packages_report() {
        let converter = EpidConverter::unlinkable()
            .with_client(IasClient::new("key").with_transport(FixedTransport));
        assert_eq!(converter.attestation_type(), EPID_UNLINKABLE_TYPE);

        let evidence = converter.convert(b"cXVvdGU=").unwrap();
        let report: IasReport = serde_json::from_slice(&evidence).unwrap();
        assert_eq!(report.body, "report");
        assert_eq!(report.signature, "c2ln");
    }
}
