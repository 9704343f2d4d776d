//! Hybrid KEM-DEM encryption: ML-KEM + HKDF-SHA256 + XChaCha20-Poly1305.
//!
//! 1. ML-KEM encapsulate to the recipient → (encapsulated, shared_secret)
//! 2. key = HKDF-SHA256(ikm = shared_secret, salt = encapsulated,
//!    info = "tetracrypt-kem-dem-v1" || label)
//! 3. ciphertext = XChaCha20-Poly1305(key, random nonce, message,
//!    aad = version || label || encapsulated)
//!
//! ML-KEM uses implicit rejection, so decapsulating with the wrong secret key
//! yields an unrelated secret and the AEAD tag check fails.

use pqcrypto_mlkem::{mlkem1024, mlkem768};
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::aead::{self, KEY_LEN, NONCE_LEN};
use crate::algorithm::{Algorithm, KeyKind};
use crate::encoding::hex_bytes;
use crate::error::CryptoError;
use crate::kdf::hkdf_expand;
use crate::keys::{KeyPair, PublicKey};

pub const PAYLOAD_VERSION: u8 = 1;
const HKDF_INFO_PREFIX: &[u8] = b"tetracrypt-kem-dem-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub version: u8,
    pub algorithm: Algorithm,
    pub standard: String,
    #[serde(with = "hex_bytes")]
    pub encapsulated: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Raw ML-KEM encapsulation. Returns (shared_secret, encapsulated).
pub fn encapsulate(recipient: &PublicKey) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>), CryptoError> {
    let invalid = |e: pqcrypto_traits::Error| {
        CryptoError::InvalidKey(format!("{} public key: {e:?}", recipient.algorithm))
    };
    match recipient.algorithm {
        Algorithm::MlKem768 => {
            let pk = mlkem768::PublicKey::from_bytes(&recipient.key).map_err(invalid)?;
            let (ss, ct) = mlkem768::encapsulate(&pk);
            Ok((Zeroizing::new(ss.as_bytes().to_vec()), ct.as_bytes().to_vec()))
        }
        Algorithm::MlKem1024 => {
            let pk = mlkem1024::PublicKey::from_bytes(&recipient.key).map_err(invalid)?;
            let (ss, ct) = mlkem1024::encapsulate(&pk);
            Ok((Zeroizing::new(ss.as_bytes().to_vec()), ct.as_bytes().to_vec()))
        }
        other => Err(not_a_kem(other)),
    }
}

/// Raw ML-KEM decapsulation.
pub fn decapsulate(key_pair: &KeyPair, encapsulated: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let algorithm = key_pair.algorithm.expect_kind(KeyKind::Kem)?;
    let expected = algorithm.ciphertext_len().unwrap_or_default();
    if encapsulated.len() != expected {
        return Err(CryptoError::InvalidInput(format!(
            "{algorithm} encapsulation must be {expected} bytes, got {}",
            encapsulated.len()
        )));
    }
    let bad_key = |e: pqcrypto_traits::Error| {
        CryptoError::InvalidKey(format!("{algorithm} secret key: {e:?}"))
    };
    let bad_ct = |e: pqcrypto_traits::Error| {
        CryptoError::InvalidInput(format!("{algorithm} encapsulation: {e:?}"))
    };
    let secret = match algorithm {
        Algorithm::MlKem768 => {
            let sk = mlkem768::SecretKey::from_bytes(key_pair.private_key_bytes()).map_err(bad_key)?;
            let ct = mlkem768::Ciphertext::from_bytes(encapsulated).map_err(bad_ct)?;
            mlkem768::decapsulate(&ct, &sk).as_bytes().to_vec()
        }
        Algorithm::MlKem1024 => {
            let sk = mlkem1024::SecretKey::from_bytes(key_pair.private_key_bytes()).map_err(bad_key)?;
            let ct = mlkem1024::Ciphertext::from_bytes(encapsulated).map_err(bad_ct)?;
            mlkem1024::decapsulate(&ct, &sk).as_bytes().to_vec()
        }
        other => return Err(not_a_kem(other)),
    };
    Ok(Zeroizing::new(secret))
}

fn not_a_kem(algorithm: Algorithm) -> CryptoError {
    CryptoError::AlgorithmMismatch {
        expected: format!("a {} algorithm", KeyKind::Kem),
        actual: algorithm.label().to_string(),
    }
}

fn derive_dem_key(
    algorithm: Algorithm,
    shared_secret: &[u8],
    encapsulated: &[u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut info = HKDF_INFO_PREFIX.to_vec();
    info.extend_from_slice(algorithm.label().as_bytes());
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    hkdf_expand(shared_secret, Some(encapsulated), &info, &mut key[..])?;
    Ok(key)
}

fn payload_aad(version: u8, algorithm: Algorithm, encapsulated: &[u8]) -> Vec<u8> {
    let label = algorithm.label().as_bytes();
    let mut aad = Vec::with_capacity(2 + label.len() + encapsulated.len());
    aad.push(version);
    aad.push(label.len() as u8);
    aad.extend_from_slice(label);
    aad.extend_from_slice(encapsulated);
    aad
}

pub fn seal(message: &[u8], recipient: &PublicKey) -> Result<EncryptedPayload, CryptoError> {
    let algorithm = recipient.algorithm.expect_kind(KeyKind::Kem)?;
    let (shared_secret, encapsulated) = encapsulate(recipient)?;
    let key = derive_dem_key(algorithm, &shared_secret, &encapsulated)?;
    let nonce = aead::generate_nonce()?;
    let aad = payload_aad(PAYLOAD_VERSION, algorithm, &encapsulated);
    let ciphertext = aead::encrypt(&key, &nonce, message, &aad)?;
    Ok(EncryptedPayload {
        version: PAYLOAD_VERSION,
        algorithm,
        standard: algorithm.standard().to_string(),
        encapsulated,
        iv: nonce.to_vec(),
        ciphertext,
    })
}

pub fn open(payload: &EncryptedPayload, key_pair: &KeyPair) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if payload.version != PAYLOAD_VERSION {
        return Err(CryptoError::InvalidInput(format!(
            "unsupported payload version {}",
            payload.version
        )));
    }
    key_pair.algorithm.expect_kind(KeyKind::Kem)?;
    if payload.algorithm != key_pair.algorithm {
        return Err(CryptoError::AlgorithmMismatch {
            expected: key_pair.algorithm.label().to_string(),
            actual: payload.algorithm.label().to_string(),
        });
    }
    let nonce: [u8; NONCE_LEN] = payload.iv.as_slice().try_into().map_err(|_| {
        CryptoError::InvalidInput(format!(
            "iv must be {NONCE_LEN} bytes, got {}",
            payload.iv.len()
        ))
    })?;
    let shared_secret = decapsulate(key_pair, &payload.encapsulated)?;
    let key = derive_dem_key(payload.algorithm, &shared_secret, &payload.encapsulated)?;
    let aad = payload_aad(payload.version, payload.algorithm, &payload.encapsulated);
    aead::decrypt(&key, &nonce, &payload.ciphertext, &aad)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_kem_agrees_on_secret() {
        for alg in [Algorithm::MlKem768, Algorithm::MlKem1024] {
            let kp = KeyPair::generate(alg).unwrap();
            let (ss, ct) = encapsulate(&kp.public()).unwrap();
            assert_eq!(ct.len(), alg.ciphertext_len().unwrap());
            let ss2 = decapsulate(&kp, &ct).unwrap();
            assert_eq!(ss.as_slice(), ss2.as_slice());
        }
    }

    #[test]
    fn seal_open_roundtrip() {
        let kp = KeyPair::generate(Algorithm::MlKem768).unwrap();
        let payload = seal(b"quantum-safe hello", &kp.public()).unwrap();
        assert_eq!(payload.iv.len(), NONCE_LEN);
        assert_eq!(payload.standard, "FIPS 203");
        let pt = open(&payload, &kp).unwrap();
        assert_eq!(pt.as_slice(), b"quantum-safe hello");
    }

    #[test]
    fn tampered_encapsulation_fails_verification() {
        let kp = KeyPair::generate(Algorithm::MlKem768).unwrap();
        let mut payload = seal(b"msg", &kp.public()).unwrap();
        payload.encapsulated[5] ^= 0x01;
        assert!(matches!(open(&payload, &kp), Err(CryptoError::AeadDecrypt)));
    }

    #[test]
    fn signature_key_cannot_receive() {
        let kp = KeyPair::generate(Algorithm::MlDsa65).unwrap();
        assert!(matches!(
            seal(b"msg", &kp.public()),
            Err(CryptoError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn bad_iv_length_is_invalid_input() {
        let kp = KeyPair::generate(Algorithm::MlKem768).unwrap();
        let mut payload = seal(b"msg", &kp.public()).unwrap();
        payload.iv.truncate(12);
        assert!(matches!(open(&payload, &kp), Err(CryptoError::InvalidInput(_))));
    }
}
