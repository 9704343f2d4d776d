//! User profiles and the key pairs they own.
//!
//! A profile owns at most one KEM pair and one signature pair. Missing pairs
//! are `None`; there is no placeholder value for "not found".

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::algorithm::{Algorithm, KeyKind};
use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};

pub const MAX_ROTATION_INTERVAL_DAYS: u32 = 3650;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Standard,
    #[default]
    Enhanced,
    Maximum,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    pub rotation_interval_days: u32,
    pub default_kem: Algorithm,
    pub default_signature: Algorithm,
    #[serde(default)]
    pub privacy_level: PrivacyLevel,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            rotation_interval_days: 90,
            default_kem: KeyKind::Kem.default_algorithm(),
            default_signature: KeyKind::Signature.default_algorithm(),
            privacy_level: PrivacyLevel::default(),
        }
    }
}

impl ProfileSettings {
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.rotation_interval_days == 0 || self.rotation_interval_days > MAX_ROTATION_INTERVAL_DAYS {
            return Err(CryptoError::InvalidInput(format!(
                "rotation interval must be 1..={MAX_ROTATION_INTERVAL_DAYS} days, got {}",
                self.rotation_interval_days
            )));
        }
        self.default_kem.expect_kind(KeyKind::Kem)?;
        self.default_signature.expect_kind(KeyKind::Signature)?;
        Ok(())
    }

    pub fn algorithm_for(&self, kind: KeyKind) -> Algorithm {
        match kind {
            KeyKind::Kem => self.default_kem,
            KeyKind::Signature => self.default_signature,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileKeys {
    #[serde(default)]
    pub kem: Option<KeyPair>,
    #[serde(default)]
    pub signature: Option<KeyPair>,
}

impl ProfileKeys {
    pub fn get(&self, kind: KeyKind) -> Option<&KeyPair> {
        match kind {
            KeyKind::Kem => self.kem.as_ref(),
            KeyKind::Signature => self.signature.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: KeyKind) -> &mut Option<KeyPair> {
        match kind {
            KeyKind::Kem => &mut self.kem,
            KeyKind::Signature => &mut self.signature,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub key_pairs: ProfileKeys,
    #[serde(default)]
    pub settings: ProfileSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Validate identity fields and generate a fresh KEM and signature pair.
    pub fn register(
        username: &str,
        display_name: &str,
        email: &str,
        settings: ProfileSettings,
    ) -> Result<Self, CryptoError> {
        validate_username(username)?;
        validate_email(email)?;
        settings.validate()?;
        let kem = KeyPair::generate(settings.default_kem)?;
        let signature = KeyPair::generate(settings.default_signature)?;
        let now = Utc::now();
        info!(username, kem = %settings.default_kem, signature = %settings.default_signature, "profile registered");
        Ok(Self {
            username: username.to_string(),
            display_name: if display_name.trim().is_empty() {
                username.to_string()
            } else {
                display_name.trim().to_string()
            },
            email: email.trim().to_string(),
            key_pairs: ProfileKeys {
                kem: Some(kem),
                signature: Some(signature),
            },
            settings,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn key_pair(&self, kind: KeyKind) -> Option<&KeyPair> {
        self.key_pairs.get(kind)
    }

    pub fn public_key(&self, kind: KeyKind) -> Option<PublicKey> {
        self.key_pair(kind).map(KeyPair::public)
    }

    /// Replace the pair for `kind` with a fresh one using the configured
    /// algorithm. Returns the retired public key, if there was one.
    pub fn rotate(&mut self, kind: KeyKind) -> Result<Option<PublicKey>, CryptoError> {
        let algorithm = self.settings.algorithm_for(kind);
        let fresh = KeyPair::generate(algorithm)?;
        let retired = self.key_pairs.slot_mut(kind).replace(fresh);
        self.updated_at = Utc::now();
        info!(username = %self.username, %kind, %algorithm, "key pair rotated");
        Ok(retired.map(|kp| kp.public()))
    }

    /// Put an externally generated pair into the slot for its kind.
    pub fn install(&mut self, key_pair: KeyPair) -> Option<PublicKey> {
        let kind = key_pair.kind();
        let retired = self.key_pairs.slot_mut(kind).replace(key_pair);
        self.updated_at = Utc::now();
        retired.map(|kp| kp.public())
    }

    pub fn update_settings(&mut self, settings: ProfileSettings) -> Result<(), CryptoError> {
        settings.validate()?;
        self.settings = settings;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Kinds whose pair is missing or older than the rotation interval.
    pub fn rotation_due(&self, now: DateTime<Utc>) -> Vec<KeyKind> {
        let max_age = Duration::days(i64::from(self.settings.rotation_interval_days));
        [KeyKind::Kem, KeyKind::Signature]
            .into_iter()
            .filter(|kind| match self.key_pair(*kind) {
                None => true,
                Some(kp) => now - kp.created >= max_age,
            })
            .collect()
    }
}

fn validate_username(username: &str) -> Result<(), CryptoError> {
    let ok = !username.is_empty()
        && username.len() <= 64
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if ok {
        Ok(())
    } else {
        Err(CryptoError::InvalidInput(format!(
            "username '{username}' must be 1-64 characters of [A-Za-z0-9_.-]"
        )))
    }
}

fn validate_email(email: &str) -> Result<(), CryptoError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CryptoError::InvalidInput(format!("'{email}' is not an email address")))
    }
}
