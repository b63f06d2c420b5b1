//! Attestation converter
//!
//! Converts base64 enclave credentials carrying an attestation into credentials
//! carrying verifiable evidence, ready to be registered at the enclave registry.
//!
//! # Usage
//!
//! ```text
//! attestation-converter <credentials-base64>
//! attestation-converter < credentials.b64
//! ```
//!
//! EPID attestations are sent to the attestation service; the API key is taken from
//! `IAS_API_KEY`, `$SGX_CREDENTIALS_PATH/api_key.txt` or
//! `$FPC_PATH/config/ias/api_key.txt`.

use anyhow::{Context, Result};
use private_chaincode::attestation::CredentialConverter;
use std::io::Read;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn read_input() -> Result<String> {
    if let Some(arg) = std::env::args().nth(1) {
        return Ok(arg);
    }
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read credentials from stdin")?;
    Ok(input)
}

fn main() -> Result<()> {
    // logs go to stderr, the converted credentials are the only stdout output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let input = read_input()?;
    let converter = CredentialConverter::with_defaults()?;
    info!(input_len = input.trim().len(), "Converting credentials");

    let converted = converter
        .convert_credentials(input.trim())
        .context("Failed to convert credentials")?;
    println!("{}", converted);
    Ok(())
}
