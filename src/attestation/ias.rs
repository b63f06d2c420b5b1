//! Intel Attestation Service client
//!
//! Submits an EPID quote for verification and packages the signed report returned by
//! the service as evidence. The request is a single blocking HTTPS call; failures are
//! returned as-is, nothing is retried.

use crate::config::{
    API_KEY_FILE, FPC_PATH_ENV, FPC_RELATIVE_API_KEY_DIR, IAS_API_KEY_ENV, SGX_CREDENTIALS_PATH_ENV,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_IAS_URL: &str = "https://api.trustedservices.intel.com/sgx/dev/attestation/v4/report";

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const REQUEST_ID_HEADER: &str = "Request-ID";
const SIGNATURE_HEADER: &str = "X-IASReport-Signature";
const CERTIFICATES_HEADER: &str = "X-IASReport-Signing-Certificate";

#[derive(Debug, Serialize)]
struct IasRequest<'a> {
    #[serde(rename = "isvEnclaveQuote")]
    quote: &'a str,
}

/// Signed attestation report, the evidence format of EPID attestations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IasReport {
    #[serde(rename = "iasSignature")]
    pub signature: String,
    #[serde(rename = "iasCertificates")]
    pub certificates: String,
    #[serde(rename = "iasReport")]
    pub body: String,
}

/// The parts of an HTTP response the client consumes
#[derive(Debug, Clone, Default)]
pub struct IasHttpResponse {
    pub status: u16,
    pub request_id: Option<String>,
    pub signature: Option<String>,
    pub certificates: Option<String>,
    pub body: String,
}

/// HTTP transport used to reach the attestation service
pub trait IasTransport: Send + Sync {
    fn post_json(&self, url: &str, api_key: &str, body: Vec<u8>) -> Result<IasHttpResponse>;
}

/// Blocking HTTPS transport
#[derive(Debug, Default, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

fn header_value(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

impl IasTransport for ReqwestTransport {
    fn post_json(&self, url: &str, api_key: &str, body: Vec<u8>) -> Result<IasHttpResponse> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SUBSCRIPTION_KEY_HEADER, api_key)
            .body(body)
            .send()
            .map_err(|e| Error::Http(format!("cannot perform http request: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .map_err(|e| Error::Http(format!("cannot read response body: {}", e)))?;

        Ok(IasHttpResponse {
            status,
            request_id: header_value(&headers, REQUEST_ID_HEADER),
            signature: header_value(&headers, SIGNATURE_HEADER),
            certificates: header_value(&headers, CERTIFICATES_HEADER),
            body,
        })
    }
}

/// Client for the attestation service's report endpoint
pub struct IasClient {
    url: String,
    api_key: String,
    transport: Box<dyn IasTransport>,
}

impl IasClient {
    /// Creates a client for [`DEFAULT_IAS_URL`] authenticating with `api_key`
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_IAS_URL.to_string(),
            api_key: api_key.into(),
            transport: Box::new(ReqwestTransport::default()),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_transport(mut self, transport: impl IasTransport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    /// Submits a base64 encoded quote and returns the serialized [`IasReport`]
    pub fn request_attestation_report(&self, quote_base64: &str) -> Result<String> {
        let request = serde_json::to_vec(&IasRequest {
            quote: quote_base64,
        })?;

        debug!(url = %self.url, "Requesting attestation report");
        let response = self.transport.post_json(&self.url, &self.api_key, request)?;

        let request_id = response.request_id.unwrap_or_default();
        if response.status != 200 {
            let reason = reqwest::StatusCode::from_u16(response.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("");
            return Err(Error::Http(format!(
                "request failed! Reason: {} {}. Request ID: {}",
                response.status, reason, request_id
            )));
        }

        info!(request_id = %request_id, "Received attestation report");
        let report = IasReport {
            signature: response.signature.unwrap_or_default(),
            certificates: response.certificates.unwrap_or_default(),
            body: response.body,
        };
        Ok(serde_json::to_string(&report)?)
    }
}

/// Loads the attestation service API key from the process environment
///
/// Sources are tried in order: `IAS_API_KEY`, `$SGX_CREDENTIALS_PATH/api_key.txt`,
/// `$FPC_PATH/config/ias/api_key.txt`.
pub fn load_api_key() -> Result<String> {
    load_api_key_with(|name| std::env::var(name).ok())
}

/// Same as [`load_api_key`] with an injectable environment lookup
pub fn load_api_key_with<F>(env: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = env(IAS_API_KEY_ENV).filter(|k| !k.is_empty()) {
        return Ok(key);
    }

    let from_credentials_path = env(SGX_CREDENTIALS_PATH_ENV)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::Config(format!("${} not set", SGX_CREDENTIALS_PATH_ENV)))
        .and_then(|path| load_api_key_from_dir(Path::new(&path)));
    if from_credentials_path.is_ok() {
        return from_credentials_path;
    }

    let fpc_path = env(FPC_PATH_ENV)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::Config(format!("${} not set", FPC_PATH_ENV)))?;
    let dir: PathBuf = Path::new(&fpc_path).join(FPC_RELATIVE_API_KEY_DIR);
    load_api_key_from_dir(&dir)
}

fn load_api_key_from_dir(dir: &Path) -> Result<String> {
    let path = dir.join(API_KEY_FILE);
    let data = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("could not read {}: {}", path.display(), e)))?;
    if data.is_empty() {
        return Err(Error::Config(format!("empty file {}", path.display())));
    }
    Ok(data.strip_suffix('\n').unwrap_or(&data).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct MockTransport {
        response: IasHttpResponse,
        requests: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
    }

    impl IasTransport for MockTransport {
        fn post_json(&self, url: &str, api_key: &str, body: Vec<u8>) -> Result<IasHttpResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), api_key.to_string(), body));
            Ok(self.response.clone())
        }
    }

    fn env_from(vars: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_successful_report_request() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let client = IasClient::new("secret").with_transport(MockTransport {
            response: IasHttpResponse {
                status: 200,
                request_id: Some("req-1".to_string()),
                signature: Some("sig".to_string()),
                certificates: Some("certs".to_string()),
                body: "{\"id\":\"1\"}".to_string(),
            },
            requests: Arc::clone(&requests),
        });

        let report = client.request_attestation_report("cXVvdGU=").unwrap();
        let report: IasReport = serde_json::from_str(&report).unwrap();
        assert_eq!(report.signature, "sig");
        assert_eq!(report.certificates, "certs");
        assert_eq!(report.body, "{\"id\":\"1\"}");

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].0, DEFAULT_IAS_URL);
        assert_eq!(requests[0].1, "secret");
        assert_eq!(requests[0].2, br#"{"isvEnclaveQuote":"cXVvdGU="}"#);
    }

    #[test]
    fn test_non_200_reports_status_and_request_id() {
        let client = IasClient::new("secret").with_transport(MockTransport {
            response: IasHttpResponse {
                status: 401,
                request_id: Some("abc123".to_string()),
                ..Default::default()
            },
            requests: Arc::new(Mutex::new(Vec::new())),
        });

        let err = client.request_attestation_report("cXVvdGU=").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("401"), "{}", message);
        assert!(message.contains("Request ID: abc123"), "{}", message);
    }

    #[test]
    fn test_api_key_from_env_var_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(API_KEY_FILE), "from-file\n").unwrap();
        let env = env_from(&[
            (IAS_API_KEY_ENV, "from-env".to_string()),
            (SGX_CREDENTIALS_PATH_ENV, dir.path().display().to_string()),
        ]);
        assert_eq!(load_api_key_with(env).unwrap(), "from-env");
    }

    #[test]
    fn test_api_key_from_credentials_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(API_KEY_FILE), "from-file\n").unwrap();
        let env = env_from(&[(SGX_CREDENTIALS_PATH_ENV, dir.path().display().to_string())]);
        assert_eq!(load_api_key_with(env).unwrap(), "from-file");
    }

    #[test]
    fn test_api_key_falls_back_to_fpc_path() {
        let empty = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let key_dir = root.path().join(FPC_RELATIVE_API_KEY_DIR);
        std::fs::create_dir_all(&key_dir).unwrap();
        std::fs::write(key_dir.join(API_KEY_FILE), "fpc-key").unwrap();

        let env = env_from(&[
            (SGX_CREDENTIALS_PATH_ENV, empty.path().display().to_string()),
            (FPC_PATH_ENV, root.path().display().to_string()),
        ]);
        assert_eq!(load_api_key_with(env).unwrap(), "fpc-key");
    }

    #[test]
    fn test_empty_api_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(API_KEY_FILE), "").unwrap();
        let env = env_from(&[(FPC_PATH_ENV, String::new()), (SGX_CREDENTIALS_PATH_ENV, dir.path().display().to_string())]);
        assert!(load_api_key_with(env).is_err());
        assert!(load_api_key_with(|_| None).is_err());
    }
}
