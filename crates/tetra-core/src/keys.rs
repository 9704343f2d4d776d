//! Key material.
//!
//! A `KeyPair` always carries its `created` timestamp: it is stamped in the
//! constructor and deserialisation refuses records without one. Labels
//! (`strength`, `standard`) are derived from the algorithm, never trusted
//! from storage.

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use fips204::ml_dsa_65;
use fips204::traits::SerDes as _;
use fips205::slh_dsa_sha2_128s;
use fips205::traits::SerDes as _;
use pqcrypto_mlkem::{mlkem1024, mlkem768};
use pqcrypto_traits::kem::{PublicKey as _, SecretKey as _};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::algorithm::{Algorithm, KeyKind};
use crate::encoding::{hex_bytes, hex_secret};
use crate::error::CryptoError;

// ── Public key ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PublicKeyRecord")]
pub struct PublicKey {
    pub algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    pub key: Vec<u8>,
}

#[derive(Deserialize)]
struct PublicKeyRecord {
    algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    key: Vec<u8>,
}

impl TryFrom<PublicKeyRecord> for PublicKey {
    type Error = CryptoError;

    fn try_from(r: PublicKeyRecord) -> Result<Self, Self::Error> {
        PublicKey::new(r.algorithm, r.key)
    }
}

impl PublicKey {
    pub fn new(algorithm: Algorithm, key: Vec<u8>) -> Result<Self, CryptoError> {
        check_len("public key", algorithm, algorithm.public_key_len(), key.len())?;
        Ok(Self { algorithm, key })
    }

    pub fn from_hex(algorithm: Algorithm, hex_str: &str) -> Result<Self, CryptoError> {
        Self::new(algorithm, hex::decode(hex_str.trim())?)
    }

    pub fn kind(&self) -> KeyKind {
        self.algorithm.kind()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.key)
    }

    /// BLAKE3 of the key bytes, truncated to 160 bits, hex in groups of 4.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.key);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Key pair ──────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "KeyPairRecord")]
pub struct KeyPair {
    pub algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex_secret")]
    private_key: Zeroizing<Vec<u8>>,
    pub strength: String,
    pub standard: String,
    pub created: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPairRecord {
    algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    public_key: Vec<u8>,
    #[serde(with = "hex_secret")]
    private_key: Zeroizing<Vec<u8>>,
    created: DateTime<Utc>,
}

impl TryFrom<KeyPairRecord> for KeyPair {
    type Error = CryptoError;

    fn try_from(r: KeyPairRecord) -> Result<Self, Self::Error> {
        KeyPair::from_parts(r.algorithm, r.public_key, r.private_key, r.created)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"<redacted>")
            .field("strength", &self.strength)
            .field("standard", &self.standard)
            .field("created", &self.created)
            .finish()
    }
}

impl KeyPair {
    pub fn generate(algorithm: Algorithm) -> Result<Self, CryptoError> {
        let (public_key, private_key) = match algorithm {
            Algorithm::MlKem768 => {
                let (pk, sk) = mlkem768::keypair();
                (pk.as_bytes().to_vec(), Zeroizing::new(sk.as_bytes().to_vec()))
            }
            Algorithm::MlKem1024 => {
                let (pk, sk) = mlkem1024::keypair();
                (pk.as_bytes().to_vec(), Zeroizing::new(sk.as_bytes().to_vec()))
            }
            Algorithm::MlDsa65 => {
                let (pk, sk) = ml_dsa_65::try_keygen().map_err(keygen_failed)?;
                (pk.into_bytes().to_vec(), Zeroizing::new(sk.into_bytes().to_vec()))
            }
            Algorithm::SlhDsaSha2_128s => {
                let (pk, sk) = slh_dsa_sha2_128s::try_keygen().map_err(keygen_failed)?;
                (pk.into_bytes().to_vec(), Zeroizing::new(sk.into_bytes().to_vec()))
            }
            Algorithm::Ed25519 => {
                let signing_key = SigningKey::generate(&mut OsRng);
                (
                    signing_key.verifying_key().to_bytes().to_vec(),
                    Zeroizing::new(signing_key.to_bytes().to_vec()),
                )
            }
        };
        Self::from_parts(algorithm, public_key, private_key, Utc::now())
    }

    /// Rebuild a key pair from stored parts, validating sizes for the algorithm.
    pub fn from_parts(
        algorithm: Algorithm,
        public_key: Vec<u8>,
        private_key: Zeroizing<Vec<u8>>,
        created: DateTime<Utc>,
    ) -> Result<Self, CryptoError> {
        check_len("public key", algorithm, algorithm.public_key_len(), public_key.len())?;
        check_len(
            "private key",
            algorithm,
            algorithm.secret_key_len(),
            private_key.len(),
        )?;
        if algorithm == Algorithm::Ed25519 {
            let secret: [u8; 32] = private_key
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("Ed25519 secret not 32 bytes".into()))?;
            let derived = SigningKey::from_bytes(&secret).verifying_key().to_bytes();
            if derived.as_slice() != public_key.as_slice() {
                return Err(CryptoError::InvalidKey(
                    "Ed25519 public key does not match private key".into(),
                ));
            }
        }
        Ok(Self {
            algorithm,
            public_key,
            private_key,
            strength: algorithm.strength().to_string(),
            standard: algorithm.standard().to_string(),
            created,
        })
    }

    pub fn kind(&self) -> KeyKind {
        self.algorithm.kind()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey {
            algorithm: self.algorithm,
            key: self.public_key.clone(),
        }
    }

    pub fn private_key_bytes(&self) -> &[u8] {
        &self.private_key
    }

    pub fn fingerprint(&self) -> String {
        self.public().fingerprint()
    }

    /// Whole days since `created`, clamped at zero for clock skew.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created).num_days().max(0)
    }
}

fn check_len(what: &str, algorithm: Algorithm, expected: usize, got: usize) -> Result<(), CryptoError> {
    if expected != got {
        return Err(CryptoError::InvalidKey(format!(
            "{algorithm} {what} must be {expected} bytes, got {got}"
        )));
    }
    Ok(())
}

fn keygen_failed(e: &'static str) -> CryptoError {
    CryptoError::Rng(format!("key generation: {e}"))
}
