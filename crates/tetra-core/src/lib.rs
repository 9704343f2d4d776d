//! tetra-core: TetraCrypt post-quantum key material and operation facade
//!
//! # Design principles
//! - No custom crypto; ML-KEM comes from the `pqcrypto` bindings, ML-DSA and
//!   SLH-DSA from the `fips204` / `fips205` crates, symmetric pieces from
//!   RustCrypto.
//! - Secret key bytes and derived keys are zeroized on drop.
//! - Every fallible call returns a tagged `Result`; nothing panics on input.
//!
//! # Module layout
//! - `algorithm` algorithm identifiers, key kinds, size metadata
//! - `keys`      `KeyPair`, `PublicKey`, fingerprints
//! - `kem`       hybrid ML-KEM + XChaCha20-Poly1305 encryption
//! - `sign`      detached signatures
//! - `kdf`       Argon2id password derivation, HKDF
//! - `aead`      XChaCha20-Poly1305 helpers
//! - `facade`    `CryptoFacade`, the call surface for UI/CLI code
//! - `profile`   user profiles and their key slots
//! - `store`     `ProfileStore` trait and the in-memory store
//! - `vault`     password-encrypted on-disk profile store
//! - `audit`     signed, hash-chained operation log
//! - `monitor`   key age checks and the periodic monitor task
//! - `selftest`  per-algorithm sanity run
//! - `config`, `paths`, `error`

pub mod aead;
pub mod algorithm;
pub mod audit;
pub mod config;
mod encoding;
pub mod error;
pub mod facade;
pub mod kdf;
pub mod kem;
pub mod keys;
pub mod monitor;
pub mod paths;
pub mod profile;
pub mod selftest;
pub mod sign;
pub mod store;
pub mod vault;

pub use algorithm::{Algorithm, KeyKind};
pub use error::{CryptoError, ErrorKind, StoreError};
pub use facade::{CryptoFacade, OperationFailure};
pub use kem::EncryptedPayload;
pub use keys::{KeyPair, PublicKey};
pub use profile::{ProfileSettings, UserProfile};
pub use sign::Signature;
pub use store::{MemoryProfileStore, ProfileStore};
pub use vault::VaultProfileStore;
