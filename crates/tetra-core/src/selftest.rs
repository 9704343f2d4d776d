//! Known-answer style sanity run over every supported algorithm.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::algorithm::{Algorithm, KeyKind};
use crate::error::{CryptoError, ErrorKind};
use crate::facade::CryptoFacade;
use crate::kdf;

const SAMPLE: &[u8] = b"tetracrypt self-test sample";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmCheck {
    pub algorithm: Algorithm,
    pub passed: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfTestReport {
    pub checks: Vec<AlgorithmCheck>,
    pub kdf_passed: bool,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.kdf_passed && self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AlgorithmCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

pub fn run(facade: &CryptoFacade) -> SelfTestReport {
    let checks = Algorithm::ALL
        .iter()
        .map(|&algorithm| {
            let start = Instant::now();
            let result = check_algorithm(facade, algorithm);
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &result {
                Ok(()) => info!(%algorithm, duration_ms, "self-test passed"),
                Err(e) => warn!(%algorithm, error = %e, "self-test failed"),
            }
            AlgorithmCheck {
                algorithm,
                passed: result.is_ok(),
                duration_ms,
                error: result.err().map(|e| e.to_string()),
            }
        })
        .collect();
    let kdf_passed = match check_kdf(facade) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "self-test: key derivation failed");
            false
        }
    };
    SelfTestReport { checks, kdf_passed }
}

fn check_algorithm(facade: &CryptoFacade, algorithm: Algorithm) -> Result<(), CryptoError> {
    let kp = facade.generate_key_pair_with(algorithm)?;
    if kp.public_key.len() != algorithm.public_key_len()
        || kp.private_key_bytes().len() != algorithm.secret_key_len()
    {
        return Err(CryptoError::Internal(format!(
            "{algorithm}: generated key sizes do not match metadata"
        )));
    }
    match algorithm.kind() {
        KeyKind::Kem => {
            let mut payload = facade.encrypt(SAMPLE, &kp.public())?;
            if Some(payload.encapsulated.len()) != algorithm.ciphertext_len() {
                return Err(CryptoError::Internal(format!(
                    "{algorithm}: encapsulation size does not match metadata"
                )));
            }
            if facade.decrypt(&payload, &kp)?.as_slice() != SAMPLE {
                return Err(CryptoError::Internal(format!("{algorithm}: round trip mismatch")));
            }
            if let Some(b) = payload.ciphertext.first_mut() {
                *b ^= 0x01;
            }
            match facade.decrypt(&payload, &kp) {
                Err(e) if e.kind() == ErrorKind::Verification => Ok(()),
                _ => Err(CryptoError::Internal(format!(
                    "{algorithm}: tampered ciphertext was accepted"
                ))),
            }
        }
        KeyKind::Signature => {
            let public = kp.public();
            let sig = facade.sign(SAMPLE, &kp)?;
            if !facade.verify(SAMPLE, &sig, &public)? {
                return Err(CryptoError::Internal(format!("{algorithm}: own signature rejected")));
            }
            let mut mutated = SAMPLE.to_vec();
            mutated[0] ^= 0x01;
            if facade.verify(&mutated, &sig, &public)? {
                return Err(CryptoError::Internal(format!(
                    "{algorithm}: mutated message verified"
                )));
            }
            Ok(())
        }
    }
}

fn check_kdf(facade: &CryptoFacade) -> Result<(), CryptoError> {
    let salt = kdf::generate_salt()?;
    let a = facade.derive_key_from_password(b"self-test", &salt)?;
    let b = facade.derive_key_from_password(b"self-test", &salt)?;
    let c = facade.derive_key_from_password(b"self-test!", &salt)?;
    if a != b || a == c {
        return Err(CryptoError::Internal("password derivation is not deterministic".into()));
    }
    Ok(())
}
