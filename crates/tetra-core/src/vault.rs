//! Password-encrypted profile vault on disk.
//!
//! File layout: a fixed 128-byte header followed by the XChaCha20-Poly1305
//! ciphertext of a JSON `VaultDocument`. The key is Argon2id(password, salt)
//! with the cost parameters recorded in the header; the header up to the
//! nonce is authenticated as associated data, so editing the KDF parameters
//! or salt fails like a wrong password does.
//!
//! Header:
//!   0..8    magic "TETRAV1\0"
//!   8..12   schema version (u32 LE)
//!   12..24  kdf time cost, memory cost, parallelism (u32 LE each)
//!   24..56  salt
//!   56..80  nonce (fresh on every write)
//!   80..128 zero

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::aead::{self, NONCE_LEN};
use crate::algorithm::Algorithm;
use crate::error::{CryptoError, StoreError};
use crate::kdf::{derive_key, generate_salt, DerivedKey, KdfParams, SALT_LEN};
use crate::keys::KeyPair;
use crate::profile::UserProfile;
use crate::store::ProfileStore;

pub const VAULT_MAGIC: &[u8; 8] = b"TETRAV1\0";
pub const SCHEMA_VERSION: u32 = 2;
pub const HEADER_SIZE: usize = 128;
const AAD_END: usize = 56;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHeader {
    pub schema_version: u32,
    pub kdf: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
}

impl VaultHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..8].copy_from_slice(VAULT_MAGIC);
        buf[8..12].copy_from_slice(&self.schema_version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.kdf.time_cost.to_le_bytes());
        buf[16..20].copy_from_slice(&self.kdf.memory_cost.to_le_bytes());
        buf[20..24].copy_from_slice(&self.kdf.parallelism.to_le_bytes());
        buf[24..56].copy_from_slice(&self.salt);
        buf[56..80].copy_from_slice(&self.nonce);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, StoreError> {
        if buf.len() < HEADER_SIZE {
            return Err(StoreError::Corrupt("header truncated".into()));
        }
        if &buf[..8] != VAULT_MAGIC {
            return Err(StoreError::Corrupt("invalid magic".into()));
        }
        let schema_version = read_u32(buf, 8);
        if schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&buf[24..56]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[56..80]);
        let kdf = KdfParams {
            time_cost: read_u32(buf, 12),
            memory_cost: read_u32(buf, 16),
            parallelism: read_u32(buf, 20),
        };
        kdf.check_limits()
            .map_err(|e| StoreError::Corrupt(format!("header: {e}")))?;
        Ok(Self {
            schema_version,
            kdf,
            salt,
            nonce,
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultDocument {
    pub vault_id: String,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Ed25519 pair that signs the operation audit log. Added in schema 2.
    #[serde(default)]
    pub audit_key: Option<KeyPair>,
    #[serde(default)]
    pub profiles: BTreeMap<String, UserProfile>,
}

#[derive(Debug)]
pub struct VaultProfileStore {
    header: VaultHeader,
    document: VaultDocument,
    path: PathBuf,
    key: Option<DerivedKey>,
}

impl VaultProfileStore {
    /// Create a new vault at `path`. Fails if the file exists.
    pub fn init<P: AsRef<Path>>(
        path: P,
        password: &str,
        kdf: KdfParams,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(StoreError::AlreadyExists(path.display().to_string()));
        }
        kdf.validate()?;
        let salt = generate_salt()?;
        let key = derive_key(password.as_bytes(), &salt, &kdf)?;
        let now = Utc::now();
        let document = VaultDocument {
            vault_id: Uuid::new_v4().to_string(),
            schema_version: SCHEMA_VERSION,
            created_at: now,
            last_modified: now,
            audit_key: Some(KeyPair::generate(Algorithm::Ed25519)?),
            profiles: BTreeMap::new(),
        };
        let mut store = Self {
            header: VaultHeader {
                schema_version: SCHEMA_VERSION,
                kdf,
                salt,
                nonce: [0u8; NONCE_LEN],
            },
            document,
            path: path.to_path_buf(),
            key: Some(key),
        };
        store.flush()?;
        info!(path = %path.display(), vault_id = %store.document.vault_id, "vault created");
        Ok(store)
    }

    pub fn open<P: AsRef<Path>>(path: P, password: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let header = VaultHeader::from_bytes(&data)?;
        header.kdf.validate()?;
        let key = derive_key(password.as_bytes(), &header.salt, &header.kdf)?;
        let plaintext = aead::decrypt(
            key.as_bytes(),
            &header.nonce,
            &data[HEADER_SIZE..],
            &data[..AAD_END],
        )
        .map_err(|e| match e {
            CryptoError::AeadDecrypt => StoreError::WrongPassword,
            other => StoreError::Crypto(other),
        })?;
        let mut document: VaultDocument = serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::Corrupt(format!("parse vault document: {e}")))?;
        let migrated = migrate_document(&mut document)?;
        let mut store = Self {
            header,
            document,
            path: path.to_path_buf(),
            key: Some(key),
        };
        if migrated {
            store.flush()?;
        }
        debug!(path = %path.display(), profiles = store.document.profiles.len(), "vault opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &VaultHeader {
        &self.header
    }

    pub fn vault_id(&self) -> &str {
        &self.document.vault_id
    }

    pub fn audit_signing_key(&self) -> Result<SigningKey, StoreError> {
        let kp = self
            .document
            .audit_key
            .as_ref()
            .ok_or_else(|| StoreError::Corrupt("vault has no audit key".into()))?;
        let secret: [u8; 32] = kp
            .private_key_bytes()
            .try_into()
            .map_err(|_| StoreError::Corrupt("audit key length invalid".into()))?;
        Ok(SigningKey::from_bytes(&secret))
    }

    /// Re-key the vault under a new password and fresh salt.
    pub fn change_password(&mut self, new_password: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        let salt = generate_salt()?;
        let key = derive_key(new_password.as_bytes(), &salt, &self.header.kdf)?;
        self.header.salt = salt;
        self.key = Some(key);
        self.flush()?;
        info!(path = %self.path.display(), "vault password changed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<&DerivedKey, StoreError> {
        self.key.as_ref().ok_or(StoreError::Closed)
    }

    /// Encrypt and atomically replace the vault file. Fresh nonce every time.
    fn flush(&mut self) -> Result<(), StoreError> {
        self.document.last_modified = Utc::now();
        self.document.schema_version = SCHEMA_VERSION;
        self.header.schema_version = SCHEMA_VERSION;
        self.header.nonce = aead::generate_nonce()?;
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(&self.document)?);
        let header_bytes = self.header.to_bytes();
        let key = self.ensure_open()?;
        let ciphertext = aead::encrypt(
            key.as_bytes(),
            &self.header.nonce,
            &plaintext,
            &header_bytes[..AAD_END],
        )?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&header_bytes)?;
        tmp.write_all(&ciphertext)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl ProfileStore for VaultProfileStore {
    fn load(&self, username: &str) -> Result<Option<UserProfile>, StoreError> {
        self.ensure_open()?;
        Ok(self.document.profiles.get(username).cloned())
    }

    fn save(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.document
            .profiles
            .insert(profile.username.clone(), profile.clone());
        self.flush()
    }

    fn delete(&mut self, username: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let removed = self.document.profiles.remove(username).is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    fn usernames(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        Ok(self.document.profiles.keys().cloned().collect())
    }

    fn teardown(&mut self) -> Result<(), StoreError> {
        if self.key.is_none() {
            return Ok(());
        }
        self.flush()?;
        self.key = None;
        self.document.profiles.clear();
        self.document.audit_key = None;
        debug!(path = %self.path.display(), "vault closed");
        Ok(())
    }
}

/// Bring an older document up to `SCHEMA_VERSION`. Returns whether anything
/// changed.
fn migrate_document(document: &mut VaultDocument) -> Result<bool, StoreError> {
    let mut changed = false;
    if document.schema_version < 2 {
        if document.audit_key.is_none() {
            document.audit_key = Some(KeyPair::generate(Algorithm::Ed25519)?);
        }
        for (name, profile) in document.profiles.iter_mut() {
            if profile.username != *name {
                return Err(StoreError::Corrupt(format!(
                    "profile keyed '{name}' is named '{}'",
                    profile.username
                )));
            }
        }
        info!(from = document.schema_version, to = SCHEMA_VERSION, "vault schema migrated");
        document.schema_version = 2;
        changed = true;
    }
    Ok(changed)
}
