use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification callers branch on.
///
/// `InvalidInput` means the caller handed over something unusable (bad hex,
/// wrong key length, a KEM key where a signing key was expected).
/// `Verification` means the input was well-formed but failed an integrity
/// check (AEAD tag, signature, wrong password). `Internal` covers everything
/// the caller cannot fix by changing the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidInput,
    Verification,
    Internal,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch { expected: String, actual: String },

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch, possible tampering or wrong key)")]
    AeadDecrypt,

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Random number generator unavailable: {0}")]
    Rng(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidKey(_)
            | CryptoError::InvalidInput(_)
            | CryptoError::UnsupportedAlgorithm(_)
            | CryptoError::AlgorithmMismatch { .. }
            | CryptoError::Serialisation(_)
            | CryptoError::HexDecode(_) => ErrorKind::InvalidInput,
            CryptoError::AeadDecrypt | CryptoError::SignatureVerification => {
                ErrorKind::Verification
            }
            CryptoError::AeadEncrypt
            | CryptoError::KeyDerivation(_)
            | CryptoError::Rng(_)
            | CryptoError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Errors raised by profile stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store is corrupt: {0}")]
    Corrupt(String),

    #[error("Unsupported schema version {found} (this build understands up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Wrong password or tampered store")]
    WrongPassword,

    #[error("Store is closed")]
    Closed,

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::WrongPassword => ErrorKind::Verification,
            StoreError::NotFound(_) | StoreError::AlreadyExists(_) => ErrorKind::InvalidInput,
            StoreError::Crypto(e) => e.kind(),
            StoreError::Io(_)
            | StoreError::Corrupt(_)
            | StoreError::UnsupportedSchema { .. }
            | StoreError::Closed
            | StoreError::Serialisation(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T, E = CryptoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_partitioned() {
        assert_eq!(
            CryptoError::InvalidKey("short".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(CryptoError::AeadDecrypt.kind(), ErrorKind::Verification);
        assert_eq!(CryptoError::Rng("gone".into()).kind(), ErrorKind::Internal);
        assert_eq!(StoreError::WrongPassword.kind(), ErrorKind::Verification);
        assert_eq!(
            StoreError::Crypto(CryptoError::SignatureVerification).kind(),
            ErrorKind::Verification
        );
    }
}
