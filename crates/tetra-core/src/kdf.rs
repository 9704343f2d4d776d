//! Key derivation.
//!
//! `derive_key` is Argon2id and backs both password-derived keys handed to
//! callers and the profile vault key. `hkdf_expand` (HKDF-SHA256) turns KEM
//! shared secrets into AEAD keys.

use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const KDF_TIME_COST: u32 = 3;
pub const KDF_MEMORY_COST: u32 = 65536; // 64MB
pub const KDF_PARALLELISM: u32 = 4;
pub const DERIVED_KEY_LEN: usize = 32;
pub const MIN_SALT_LEN: usize = 16;
pub const SALT_LEN: usize = 32;

/// Upper bounds on accepted parameters. Vault headers are read before the
/// password is checked, so these keep a crafted header from pinning the
/// machine.
pub const MAX_TIME_COST: u32 = 16;
pub const MAX_MEMORY_COST: u32 = 4 * 1024 * 1024; // 4 GiB
pub const MAX_PARALLELISM: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub time_cost: u32,
    /// KiB.
    pub memory_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: KDF_TIME_COST,
            memory_cost: KDF_MEMORY_COST,
            parallelism: KDF_PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Cheapest parameters Argon2 accepts. Only for tests and throwaway stores.
    pub fn insecure_fast() -> Self {
        Self {
            time_cost: 1,
            memory_cost: 8 * 1024,
            parallelism: 1,
        }
    }

    fn to_argon2(self) -> Result<Params, CryptoError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(DERIVED_KEY_LEN),
        )
        .map_err(|e| CryptoError::InvalidInput(format!("argon2 params: {e}")))
    }

    pub fn check_limits(&self) -> Result<(), CryptoError> {
        if self.time_cost > MAX_TIME_COST
            || self.memory_cost > MAX_MEMORY_COST
            || self.parallelism > MAX_PARALLELISM
        {
            return Err(CryptoError::InvalidInput(format!(
                "argon2 params over limit: t={} m={}KiB p={} (max t={MAX_TIME_COST} m={MAX_MEMORY_COST}KiB p={MAX_PARALLELISM})",
                self.time_cost, self.memory_cost, self.parallelism
            )));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CryptoError> {
        self.check_limits()?;
        self.to_argon2().map(|_| ())
    }
}

/// 32-byte key derived from a password. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

pub fn derive_key(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<DerivedKey, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "salt must be at least {MIN_SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }
    let argon = Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut output = [0u8; DERIVED_KEY_LEN];
    argon
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let key = DerivedKey(output);
    output.zeroize();
    Ok(key)
}

pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    Ok(salt)
}

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}
