//! Tag-keyed handler tables
//!
//! Handlers are registered once at bootstrap; the tables never shrink.

use crate::attestation::{Attestation, Converter, Evidence, EvidenceVerifier, ValidationValues};
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// Routes attestations to the converter registered for their type
#[derive(Default)]
pub struct ConverterDispatcher {
    converters: HashMap<String, Box<dyn Converter>>,
}

impl ConverterDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds converters, failing on the first tag that is already taken
    ///
    /// Converters preceding the duplicate remain registered.
    pub fn register<I>(&mut self, converters: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn Converter>>,
    {
        for converter in converters {
            let attestation_type = converter.attestation_type().to_string();
            if self.converters.contains_key(&attestation_type) {
                return Err(Error::AlreadyRegistered(attestation_type));
            }
            debug!(attestation_type = %attestation_type, "Register converter");
            self.converters.insert(attestation_type, converter);
        }
        Ok(())
    }

    pub fn convert(&self, attestation: &Attestation) -> Result<Evidence> {
        let converter = self
            .converters
            .get(&attestation.attestation_type)
            .ok_or_else(|| Error::UnregisteredType(attestation.attestation_type.clone()))?;

        debug!(attestation_type = %attestation.attestation_type, "Invoke converter");
        let evidence = converter.convert(attestation.data.as_bytes())?;

        Ok(Evidence {
            attestation_type: attestation.attestation_type.clone(),
            data: String::from_utf8(evidence)
                .map_err(|e| Error::Encoding(format!("evidence is not valid UTF-8: {}", e)))?,
        })
    }
}

/// Routes evidence to the verifier registered for its type
#[derive(Default)]
pub struct VerifierDispatcher {
    verifiers: HashMap<String, Box<dyn EvidenceVerifier>>,
}

impl VerifierDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds verifiers, failing on the first tag that is already taken
    pub fn register<I>(&mut self, verifiers: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn EvidenceVerifier>>,
    {
        for verifier in verifiers {
            let attestation_type = verifier.attestation_type().to_string();
            if self.verifiers.contains_key(&attestation_type) {
                return Err(Error::AlreadyRegistered(attestation_type));
            }
            debug!(attestation_type = %attestation_type, "Register verifier");
            self.verifiers.insert(attestation_type, verifier);
        }
        Ok(())
    }

    pub fn verify(&self, evidence: &Evidence, expected: &ValidationValues) -> Result<()> {
        let verifier = self
            .verifiers
            .get(&evidence.attestation_type)
            .ok_or_else(|| Error::UnregisteredType(evidence.attestation_type.clone()))?;

        debug!(attestation_type = %evidence.attestation_type, "Invoke verifier");
        verifier.verify(evidence, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::simulation::{SimulationConverter, SimulationVerifier};

    struct DummyConverter;

    impl Converter for DummyConverter {
        fn attestation_type(&self) -> &str {
            "dummy"
        }

        fn convert(&self, _attestation: &[u8]) -> Result<Vec<u8>> {
            Ok(b"dummy evidence".to_vec())
        }
    }

    struct RejectingVerifier;

    impl EvidenceVerifier for RejectingVerifier {
        fn attestation_type(&self) -> &str {
            "dummy"
        }

        fn verify(&self, _evidence: &Evidence, _expected: &ValidationValues) -> Result<()> {
            Err(Error::Attestation("always rejects".to_string()))
        }
    }

    fn dummy_attestation() -> Attestation {
        Attestation {
            attestation_type: "dummy".to_string(),
            data: String::new(),
        }
    }

    #[test]
    fn test_converter_dispatcher() {
        let mut dispatcher = ConverterDispatcher::new();

        let err = dispatcher.convert(&dummy_attestation()).unwrap_err();
        assert!(matches!(err, Error::UnregisteredType(_)));
        assert_eq!(err.to_string(), "'dummy' type is not registered");

        dispatcher
            .register([Box::new(DummyConverter) as Box<dyn Converter>])
            .unwrap();
        let evidence = dispatcher.convert(&dummy_attestation()).unwrap();
        assert_eq!(evidence.attestation_type, "dummy");
        assert_eq!(evidence.data, "dummy evidence");

        let err = dispatcher
            .register([Box::new(DummyConverter) as Box<dyn Converter>])
            .unwrap_err();
        assert_eq!(err.to_string(), "'dummy' type is already registered");

        dispatcher
            .register([Box::new(SimulationConverter) as Box<dyn Converter>])
            .unwrap();
    }

    #[test]
    fn test_verifier_dispatcher() {
        let mut dispatcher = VerifierDispatcher::new();
        let evidence = Evidence {
            attestation_type: "dummy".to_string(),
            data: String::new(),
        };
        let expected = ValidationValues {
            statement: Vec::new(),
            mrenclave: String::new(),
        };

        assert!(matches!(
            dispatcher.verify(&evidence, &expected),
            Err(Error::UnregisteredType(_))
        ));

        dispatcher
            .register([
                Box::new(RejectingVerifier) as Box<dyn EvidenceVerifier>,
                Box::new(SimulationVerifier),
            ])
            .unwrap();

        // handler errors propagate unchanged
        assert!(matches!(
            dispatcher.verify(&evidence, &expected),
            Err(Error::Attestation(_))
        ));

        let simulated = Evidence {
            attestation_type: "simulated".to_string(),
            data: "MA==".to_string(),
        };
        dispatcher.verify(&simulated, &expected).unwrap();

        assert!(matches!(
            dispatcher.register([Box::new(SimulationVerifier) as Box<dyn EvidenceVerifier>]),
            Err(Error::AlreadyRegistered(_))
        ));
    }
}
