//! Algorithm identifiers and their fixed metadata.
//!
//! Sizes come straight from the binding crates so the labels shown to users
//! can never drift from what is actually generated.

use std::fmt;
use std::str::FromStr;

use fips204::ml_dsa_65;
use fips205::slh_dsa_sha2_128s;
use pqcrypto_mlkem::{mlkem1024, mlkem768};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Key encapsulation (used for encryption).
    Kem,
    Signature,
}

impl KeyKind {
    pub fn default_algorithm(self) -> Algorithm {
        match self {
            KeyKind::Kem => Algorithm::MlKem768,
            KeyKind::Signature => Algorithm::MlDsa65,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Kem => f.write_str("kem"),
            KeyKind::Signature => f.write_str("signature"),
        }
    }
}

impl FromStr for KeyKind {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kem" | "encryption" | "pqkem" => Ok(KeyKind::Kem),
            "signature" | "sig" | "signing" | "pqsig" => Ok(KeyKind::Signature),
            other => Err(CryptoError::InvalidInput(format!("unknown key kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    MlKem768,
    MlKem1024,
    MlDsa65,
    SlhDsaSha2_128s,
    /// Classical signature, kept for interop with pre-quantum peers.
    Ed25519,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::MlKem768,
        Algorithm::MlKem1024,
        Algorithm::MlDsa65,
        Algorithm::SlhDsaSha2_128s,
        Algorithm::Ed25519,
    ];

    pub fn kind(self) -> KeyKind {
        match self {
            Algorithm::MlKem768 | Algorithm::MlKem1024 => KeyKind::Kem,
            Algorithm::MlDsa65 | Algorithm::SlhDsaSha2_128s | Algorithm::Ed25519 => {
                KeyKind::Signature
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Algorithm::MlKem768 => "ML-KEM-768",
            Algorithm::MlKem1024 => "ML-KEM-1024",
            Algorithm::MlDsa65 => "ML-DSA-65",
            Algorithm::SlhDsaSha2_128s => "SLH-DSA-SHA2-128s",
            Algorithm::Ed25519 => "Ed25519",
        }
    }

    pub fn strength(self) -> &'static str {
        match self {
            Algorithm::MlKem768 | Algorithm::MlDsa65 => "NIST Level 3",
            Algorithm::MlKem1024 => "NIST Level 5",
            Algorithm::SlhDsaSha2_128s => "NIST Level 1",
            Algorithm::Ed25519 => "Classical (pre-quantum)",
        }
    }

    pub fn standard(self) -> &'static str {
        match self {
            Algorithm::MlKem768 | Algorithm::MlKem1024 => "FIPS 203",
            Algorithm::MlDsa65 => "FIPS 204",
            Algorithm::SlhDsaSha2_128s => "FIPS 205",
            Algorithm::Ed25519 => "RFC 8032",
        }
    }

    pub fn is_post_quantum(self) -> bool {
        !matches!(self, Algorithm::Ed25519)
    }

    pub fn public_key_len(self) -> usize {
        match self {
            Algorithm::MlKem768 => mlkem768::public_key_bytes(),
            Algorithm::MlKem1024 => mlkem1024::public_key_bytes(),
            Algorithm::MlDsa65 => ml_dsa_65::PK_LEN,
            Algorithm::SlhDsaSha2_128s => slh_dsa_sha2_128s::PK_LEN,
            Algorithm::Ed25519 => ed25519_dalek::PUBLIC_KEY_LENGTH,
        }
    }

    pub fn secret_key_len(self) -> usize {
        match self {
            Algorithm::MlKem768 => mlkem768::secret_key_bytes(),
            Algorithm::MlKem1024 => mlkem1024::secret_key_bytes(),
            Algorithm::MlDsa65 => ml_dsa_65::SK_LEN,
            Algorithm::SlhDsaSha2_128s => slh_dsa_sha2_128s::SK_LEN,
            Algorithm::Ed25519 => ed25519_dalek::SECRET_KEY_LENGTH,
        }
    }

    /// Encapsulation size for KEMs, `None` for signature algorithms.
    pub fn ciphertext_len(self) -> Option<usize> {
        match self {
            Algorithm::MlKem768 => Some(mlkem768::ciphertext_bytes()),
            Algorithm::MlKem1024 => Some(mlkem1024::ciphertext_bytes()),
            _ => None,
        }
    }

    /// Detached signature size, `None` for KEMs. All three schemes produce
    /// fixed-length signatures.
    pub fn signature_len(self) -> Option<usize> {
        match self {
            Algorithm::MlDsa65 => Some(ml_dsa_65::SIG_LEN),
            Algorithm::SlhDsaSha2_128s => Some(slh_dsa_sha2_128s::SIG_LEN),
            Algorithm::Ed25519 => Some(ed25519_dalek::SIGNATURE_LENGTH),
            _ => None,
        }
    }

    /// Fail with `AlgorithmMismatch` unless `self` is of the requested kind.
    pub fn expect_kind(self, kind: KeyKind) -> Result<Self, CryptoError> {
        if self.kind() == kind {
            Ok(self)
        } else {
            Err(CryptoError::AlgorithmMismatch {
                expected: format!("a {kind} algorithm"),
                actual: self.label().to_string(),
            })
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Algorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "ml-kem-768" | "mlkem768" | "kyber768" | "kyber-768" => Ok(Algorithm::MlKem768),
            "ml-kem-1024" | "mlkem1024" | "kyber1024" | "kyber-1024" => Ok(Algorithm::MlKem1024),
            "ml-dsa-65" | "mldsa65" | "dilithium3" | "dilithium-3" => Ok(Algorithm::MlDsa65),
            "slh-dsa-sha2-128s" | "slh-dsa" | "sphincs+" | "sphincs+-sha2-128s" => {
                Ok(Algorithm::SlhDsaSha2_128s)
            }
            "ed25519" => Ok(Algorithm::Ed25519),
            other if other.starts_with("falcon") || other.starts_with("bike") => Err(
                CryptoError::UnsupportedAlgorithm(format!("'{s}' is not offered by this build")),
            ),
            _ => Err(CryptoError::UnsupportedAlgorithm(format!("unknown algorithm '{s}'"))),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Algorithm> for String {
    fn from(value: Algorithm) -> Self {
        value.label().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_str() {
        for alg in Algorithm::ALL {
            assert_eq!(alg.label().parse::<Algorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn legacy_names_are_accepted() {
        assert_eq!("Kyber768".parse::<Algorithm>().unwrap(), Algorithm::MlKem768);
        assert_eq!("dilithium3".parse::<Algorithm>().unwrap(), Algorithm::MlDsa65);
        assert_eq!(
            "SPHINCS+".parse::<Algorithm>().unwrap(),
            Algorithm::SlhDsaSha2_128s
        );
    }

    #[test]
    fn display_only_families_are_rejected() {
        let err = "Falcon-512".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedAlgorithm(_)));
        assert!("BIKE-L1".parse::<Algorithm>().is_err());
    }

    #[test]
    fn metadata_is_consistent_with_kind() {
        for alg in Algorithm::ALL {
            match alg.kind() {
                KeyKind::Kem => {
                    assert!(alg.ciphertext_len().is_some());
                    assert!(alg.signature_len().is_none());
                }
                KeyKind::Signature => {
                    assert!(alg.signature_len().is_some());
                    assert!(alg.ciphertext_len().is_none());
                }
            }
            assert!(alg.public_key_len() > 0);
        }
    }

    #[test]
    fn sizes_match_published_parameter_sets() {
        // (public key, secret key, ciphertext or signature)
        let table = [
            (Algorithm::MlKem768, 1184, 2400, 1088),
            (Algorithm::MlKem1024, 1568, 3168, 1568),
            (Algorithm::MlDsa65, 1952, 4032, 3309),
            (Algorithm::SlhDsaSha2_128s, 32, 64, 7856),
            (Algorithm::Ed25519, 32, 32, 64),
        ];
        for (alg, pk, sk, out) in table {
            assert_eq!(alg.public_key_len(), pk, "{alg} public key");
            assert_eq!(alg.secret_key_len(), sk, "{alg} secret key");
            let produced = alg.ciphertext_len().or(alg.signature_len());
            assert_eq!(produced, Some(out), "{alg} output");
        }
    }

    #[test]
    fn standards_follow_the_fips_numbering() {
        assert_eq!(Algorithm::MlKem768.standard(), "FIPS 203");
        assert_eq!(Algorithm::MlDsa65.standard(), "FIPS 204");
        assert_eq!(Algorithm::SlhDsaSha2_128s.standard(), "FIPS 205");
        assert!(!Algorithm::Ed25519.is_post_quantum());
    }

    #[test]
    fn serde_uses_label() {
        let json = serde_json::to_string(&Algorithm::MlDsa65).unwrap();
        assert_eq!(json, "\"ML-DSA-65\"");
        let back: Algorithm = serde_json::from_str("\"kyber1024\"").unwrap();
        assert_eq!(back, Algorithm::MlKem1024);
    }

    #[test]
    fn expect_kind_rejects_wrong_family() {
        assert!(Algorithm::MlKem768.expect_kind(KeyKind::Kem).is_ok());
        assert!(matches!(
            Algorithm::MlKem768.expect_kind(KeyKind::Signature),
            Err(CryptoError::AlgorithmMismatch { .. })
        ));
    }
}
