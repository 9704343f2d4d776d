//! The call surface UI and CLI code use for every cryptographic operation.
//!
//! Calls are synchronous and independent of each other; the facade holds only
//! configuration and an optional audit log. Nothing here sleeps or fakes
//! progress. Failures come back as `CryptoError`; callers that need the
//! structured record shown to users pass it through [`CryptoFacade::report`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info_span, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::algorithm::{Algorithm, KeyKind};
use crate::audit::{AuditLog, AuditOutcome};
use crate::config::FacadeConfig;
use crate::error::{CryptoError, ErrorKind};
use crate::kdf::{self, DerivedKey};
use crate::kem::{self, EncryptedPayload};
use crate::keys::{KeyPair, PublicKey};
use crate::sign::{self, Signature};

/// What a failed operation looks like to a user-facing caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailure {
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
}

#[derive(Debug, Default, Clone)]
pub struct CryptoFacade {
    config: FacadeConfig,
    audit: Option<Arc<AuditLog>>,
}

impl CryptoFacade {
    pub fn new(config: FacadeConfig) -> Result<Self, CryptoError> {
        config.validate()?;
        Ok(Self {
            config,
            audit: None,
        })
    }

    pub fn with_audit_log(mut self, log: Arc<AuditLog>) -> Self {
        self.audit = Some(log);
        self
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn generate_key_pair(&self, kind: KeyKind) -> Result<KeyPair, CryptoError> {
        self.generate_key_pair_with(self.config.default_for(kind))
    }

    pub fn generate_key_pair_with(&self, algorithm: Algorithm) -> Result<KeyPair, CryptoError> {
        let _span = info_span!("generate_key_pair", algorithm = %algorithm).entered();
        let result = KeyPair::generate(algorithm);
        if let Ok(kp) = &result {
            debug!(fingerprint = %kp.fingerprint(), "key pair generated");
        }
        self.record("generate_key_pair", Some(algorithm), &result, |kp| {
            serde_json::json!({ "fingerprint": kp.fingerprint() })
        });
        result
    }

    pub fn encrypt(
        &self,
        message: &[u8],
        recipient: &PublicKey,
    ) -> Result<EncryptedPayload, CryptoError> {
        let _span = info_span!("encrypt", algorithm = %recipient.algorithm).entered();
        let result = kem::seal(message, recipient);
        self.record("encrypt", Some(recipient.algorithm), &result, |_| {
            serde_json::json!({ "recipient": recipient.fingerprint() })
        });
        result
    }

    pub fn decrypt(
        &self,
        payload: &EncryptedPayload,
        key_pair: &KeyPair,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let _span = info_span!("decrypt", algorithm = %payload.algorithm).entered();
        let result = kem::open(payload, key_pair);
        self.record("decrypt", Some(payload.algorithm), &result, |_| {
            serde_json::json!({ "recipient": key_pair.fingerprint() })
        });
        result
    }

    pub fn sign(&self, message: &[u8], key_pair: &KeyPair) -> Result<Signature, CryptoError> {
        let _span = info_span!("sign", algorithm = %key_pair.algorithm).entered();
        let result = sign::sign(message, key_pair);
        self.record("sign", Some(key_pair.algorithm), &result, |_| {
            serde_json::json!({ "signer": key_pair.fingerprint() })
        });
        result
    }

    pub fn verify(
        &self,
        message: &[u8],
        signature: &Signature,
        public_key: &PublicKey,
    ) -> Result<bool, CryptoError> {
        let _span = info_span!("verify", algorithm = %public_key.algorithm).entered();
        let result = sign::verify(message, signature, public_key);
        if let Ok(false) = result {
            debug!("signature rejected");
        }
        self.record("verify", Some(public_key.algorithm), &result, |valid| {
            serde_json::json!({ "signer": public_key.fingerprint(), "valid": valid })
        });
        result
    }

    /// Argon2id with the configured cost parameters.
    pub fn derive_key_from_password(
        &self,
        password: &[u8],
        salt: &[u8],
    ) -> Result<DerivedKey, CryptoError> {
        let _span = info_span!("derive_key_from_password").entered();
        let result = kdf::derive_key(password, salt, &self.config.kdf);
        self.record("derive_key_from_password", None, &result, |_| {
            serde_json::json!({ "salt_len": salt.len() })
        });
        result
    }

    pub fn generate_salt(&self) -> Result<[u8; kdf::SALT_LEN], CryptoError> {
        kdf::generate_salt()
    }

    /// Turn an error into the structured record shown to users, logging it
    /// on the way. Verification failures are expected traffic and log at
    /// `warn`; internal failures log at `error`.
    pub fn report(&self, operation: &str, err: &CryptoError) -> OperationFailure {
        let failure = OperationFailure {
            operation: operation.to_string(),
            kind: err.kind(),
            message: err.to_string(),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
        };
        match failure.kind {
            ErrorKind::Internal => error!(
                operation,
                request_id = %failure.request_id,
                error = %err,
                "cryptographic operation failed"
            ),
            _ => warn!(
                operation,
                request_id = %failure.request_id,
                kind = ?failure.kind,
                error = %err,
                "cryptographic operation rejected"
            ),
        }
        failure
    }

    fn record<T, F>(
        &self,
        operation: &str,
        algorithm: Option<Algorithm>,
        result: &Result<T, CryptoError>,
        detail: F,
    ) where
        F: FnOnce(&T) -> serde_json::Value,
    {
        let Some(log) = self.audit.as_ref().filter(|_| self.config.audit) else {
            return;
        };
        let (outcome, detail) = match result {
            Ok(value) => (AuditOutcome::Success, detail(value)),
            Err(e) => (
                AuditOutcome::Failure,
                serde_json::json!({ "kind": e.kind(), "error": e.to_string() }),
            ),
        };
        if let Err(e) = log.append(operation, algorithm.map(Algorithm::label), outcome, detail) {
            warn!(operation, error = %e, "audit append failed");
        }
    }
}
