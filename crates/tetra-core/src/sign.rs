//! Detached signatures: ML-DSA-65, SLH-DSA-SHA2-128s and Ed25519.
//!
//! `verify` answers `Ok(false)` for anything that is a cryptographic
//! mismatch, including signature bytes that do not even parse and public key
//! bytes that are not a valid point. Errors are reserved for inputs that are
//! structurally wrong: algorithm mismatch or wrong public key length.

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use fips204::ml_dsa_65;
use fips204::traits::{SerDes as _, Signer as _, Verifier as _};
use fips205::slh_dsa_sha2_128s;
use fips205::traits::{SerDes as _, Signer as _, Verifier as _};
use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, KeyKind};
use crate::encoding::hex_bytes;
use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};

/// FIPS 204/205 domain separation context. Empty, so signatures verify
/// with any other implementation using the default context.
const SIGNING_CONTEXT: &[u8] = b"";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl Signature {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.signature)
    }
}

pub fn sign(message: &[u8], key_pair: &KeyPair) -> Result<Signature, CryptoError> {
    let algorithm = key_pair.algorithm.expect_kind(KeyKind::Signature)?;
    let secret = key_pair.private_key_bytes();
    let bad_key = |e: &str| CryptoError::InvalidKey(format!("{algorithm} secret key: {e}"));
    let signature = match algorithm {
        Algorithm::MlDsa65 => {
            let bytes = <[u8; ml_dsa_65::SK_LEN]>::try_from(secret)
                .map_err(|_| bad_key("wrong length"))?;
            let sk = ml_dsa_65::PrivateKey::try_from_bytes(bytes).map_err(bad_key)?;
            sk.try_sign(message, SIGNING_CONTEXT)
                .map_err(|e| CryptoError::Internal(format!("{algorithm} signing: {e}")))?
                .to_vec()
        }
        Algorithm::SlhDsaSha2_128s => {
            let bytes = <[u8; slh_dsa_sha2_128s::SK_LEN]>::try_from(secret)
                .map_err(|_| bad_key("wrong length"))?;
            let sk = slh_dsa_sha2_128s::PrivateKey::try_from_bytes(&bytes).map_err(bad_key)?;
            sk.try_sign(message, SIGNING_CONTEXT, true)
                .map_err(|e| CryptoError::Internal(format!("{algorithm} signing: {e}")))?
                .to_vec()
        }
        Algorithm::Ed25519 => {
            let bytes: [u8; 32] = secret
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("Ed25519 secret not 32 bytes".into()))?;
            SigningKey::from_bytes(&bytes).sign(message).to_bytes().to_vec()
        }
        other => {
            return Err(CryptoError::AlgorithmMismatch {
                expected: format!("a {} algorithm", KeyKind::Signature),
                actual: other.label().to_string(),
            })
        }
    };
    Ok(Signature { algorithm, signature })
}

pub fn verify(message: &[u8], signature: &Signature, public_key: &PublicKey) -> Result<bool, CryptoError> {
    let algorithm = public_key.algorithm.expect_kind(KeyKind::Signature)?;
    if signature.algorithm != algorithm {
        return Err(CryptoError::AlgorithmMismatch {
            expected: algorithm.label().to_string(),
            actual: signature.algorithm.label().to_string(),
        });
    }
    if public_key.key.len() != algorithm.public_key_len() {
        return Err(CryptoError::InvalidKey(format!(
            "{algorithm} public key must be {} bytes, got {}",
            algorithm.public_key_len(),
            public_key.key.len()
        )));
    }
    let sig = signature.signature.as_slice();
    let ok = match algorithm {
        Algorithm::MlDsa65 => {
            let (Ok(pk_bytes), Ok(sig)) = (
                <[u8; ml_dsa_65::PK_LEN]>::try_from(public_key.key.as_slice()),
                <[u8; ml_dsa_65::SIG_LEN]>::try_from(sig),
            ) else {
                return Ok(false);
            };
            let Ok(pk) = ml_dsa_65::PublicKey::try_from_bytes(pk_bytes) else {
                return Ok(false);
            };
            pk.verify(message, &sig, SIGNING_CONTEXT)
        }
        Algorithm::SlhDsaSha2_128s => {
            let (Ok(pk_bytes), Ok(sig)) = (
                <[u8; slh_dsa_sha2_128s::PK_LEN]>::try_from(public_key.key.as_slice()),
                <[u8; slh_dsa_sha2_128s::SIG_LEN]>::try_from(sig),
            ) else {
                return Ok(false);
            };
            let Ok(pk) = slh_dsa_sha2_128s::PublicKey::try_from_bytes(&pk_bytes) else {
                return Ok(false);
            };
            pk.verify(message, &sig, SIGNING_CONTEXT)
        }
        Algorithm::Ed25519 => {
            let Ok(pk_bytes) = <[u8; 32]>::try_from(public_key.key.as_slice()) else {
                return Ok(false);
            };
            let Ok(vk) = VerifyingKey::from_bytes(&pk_bytes) else {
                return Ok(false);
            };
            let Ok(sig) = ed25519_dalek::Signature::from_slice(sig) else {
                return Ok(false);
            };
            vk.verify_strict(message, &sig).is_ok()
        }
        _ => false,
    };
    Ok(ok)
}

/// Like `verify`, but a mismatch is an error. Handy with `?`.
pub fn verify_strict(message: &[u8], signature: &Signature, public_key: &PublicKey) -> Result<(), CryptoError> {
    if verify(message, signature, public_key)? {
        Ok(())
    } else {
        Err(CryptoError::SignatureVerification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_sign_verify() {
        let kp = KeyPair::generate(Algorithm::Ed25519).unwrap();
        let sig = sign(b"ping", &kp).unwrap();
        assert_eq!(sig.signature.len(), 64);
        assert!(verify(b"ping", &sig, &kp.public()).unwrap());
        assert!(!verify(b"pong", &sig, &kp.public()).unwrap());
    }

    #[test]
    fn mldsa_sign_verify() {
        let kp = KeyPair::generate(Algorithm::MlDsa65).unwrap();
        let sig = sign(b"ping", &kp).unwrap();
        assert_eq!(sig.signature.len(), 3309);
        assert!(verify(b"ping", &sig, &kp.public()).unwrap());
        assert!(!verify(b"pong", &sig, &kp.public()).unwrap());
    }

    #[test]
    fn slhdsa_sign_verify() {
        let kp = KeyPair::generate(Algorithm::SlhDsaSha2_128s).unwrap();
        assert_eq!(kp.public_key.len(), 32);
        let sig = sign(b"ping", &kp).unwrap();
        assert_eq!(sig.signature.len(), 7856);
        assert!(verify(b"ping", &sig, &kp.public()).unwrap());
        assert!(!verify(b"pong", &sig, &kp.public()).unwrap());
    }

    #[test]
    fn mldsa_signature_of_wrong_length_is_false() {
        let kp = KeyPair::generate(Algorithm::MlDsa65).unwrap();
        let mut sig = sign(b"ping", &kp).unwrap();
        sig.signature.push(0);
        assert!(!verify(b"ping", &sig, &kp.public()).unwrap());
    }

    #[test]
    fn kem_key_cannot_sign() {
        let kp = KeyPair::generate(Algorithm::MlKem768).unwrap();
        assert!(matches!(sign(b"x", &kp), Err(CryptoError::AlgorithmMismatch { .. })));
    }

    #[test]
    fn signature_algorithm_must_match_key() {
        let ed = KeyPair::generate(Algorithm::Ed25519).unwrap();
        let dsa = KeyPair::generate(Algorithm::MlDsa65).unwrap();
        let sig = sign(b"x", &ed).unwrap();
        assert!(matches!(
            verify(b"x", &sig, &dsa.public()),
            Err(CryptoError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn truncated_signature_is_false_not_error() {
        let kp = KeyPair::generate(Algorithm::Ed25519).unwrap();
        let mut sig = sign(b"x", &kp).unwrap();
        sig.signature.truncate(10);
        assert!(!verify(b"x", &sig, &kp.public()).unwrap());
    }

    #[test]
    fn verify_strict_maps_mismatch_to_error() {
        let kp = KeyPair::generate(Algorithm::Ed25519).unwrap();
        let sig = sign(b"x", &kp).unwrap();
        assert!(verify_strict(b"x", &sig, &kp.public()).is_ok());
        assert!(matches!(
            verify_strict(b"y", &sig, &kp.public()),
            Err(CryptoError::SignatureVerification)
        ));
    }
}
