use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithm::{Algorithm, KeyKind};
use crate::audit::DEFAULT_MAX_BYTES;
use crate::error::CryptoError;
use crate::kdf::KdfParams;

/// Facade configuration, stored as `config.json` in the data directory.
/// Keys are camelCase, like every other JSON document the crate writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacadeConfig {
    #[serde(default = "default_kem")]
    pub default_kem: Algorithm,
    #[serde(default = "default_signature")]
    pub default_signature: Algorithm,
    #[serde(default)]
    pub kdf: KdfParams,
    /// Append every facade operation to the signed audit log.
    #[serde(default = "default_audit")]
    pub audit: bool,
    /// Size at which the audit log rotates.
    #[serde(default = "default_audit_max_bytes")]
    pub audit_max_bytes: u64,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            default_kem: default_kem(),
            default_signature: default_signature(),
            kdf: KdfParams::default(),
            audit: default_audit(),
            audit_max_bytes: default_audit_max_bytes(),
        }
    }
}

impl FacadeConfig {
    pub fn validate(&self) -> Result<(), CryptoError> {
        self.default_kem.expect_kind(KeyKind::Kem)?;
        self.default_signature.expect_kind(KeyKind::Signature)?;
        if self.audit_max_bytes == 0 {
            return Err(CryptoError::InvalidInput("auditMaxBytes must be positive".into()));
        }
        self.kdf.validate()
    }

    pub fn default_for(&self, kind: KeyKind) -> Algorithm {
        match kind {
            KeyKind::Kem => self.default_kem,
            KeyKind::Signature => self.default_signature,
        }
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, CryptoError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let bytes = fs::read(path)
            .map_err(|e| CryptoError::Internal(format!("read {}: {e}", path.display())))?;
        let config: FacadeConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        self.validate()?;
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)
            .map_err(|e| CryptoError::Internal(format!("write {}: {e}", path.display())))
    }
}

fn default_kem() -> Algorithm {
    KeyKind::Kem.default_algorithm()
}

fn default_signature() -> Algorithm {
    KeyKind::Signature.default_algorithm()
}

fn default_audit() -> bool {
    true
}

fn default_audit_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let cfg = FacadeConfig::load_or_default(&dir.path().join("config.json")).unwrap();
        assert_eq!(cfg, FacadeConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"defaultKem":"ML-KEM-1024"}"#).unwrap();
        let cfg = FacadeConfig::load_or_default(&path).unwrap();
        assert_eq!(cfg.default_kem, Algorithm::MlKem1024);
        assert_eq!(cfg.default_signature, Algorithm::MlDsa65);
        assert!(cfg.audit);
        assert_eq!(cfg.audit_max_bytes, DEFAULT_MAX_BYTES);
    }

    #[test]
    fn keys_are_camel_case_throughout() {
        let v = serde_json::to_value(FacadeConfig::default()).unwrap();
        let keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
        for key in ["defaultKem", "defaultSignature", "kdf", "audit", "auditMaxBytes"] {
            assert!(keys.contains(&key), "missing {key} in {keys:?}");
        }
        assert!(keys.iter().all(|k| !k.contains('_')), "{keys:?}");
        let kdf = v["kdf"].as_object().unwrap();
        assert!(kdf.contains_key("timeCost"));
        assert!(kdf.contains_key("memoryCost"));
        assert!(kdf.contains_key("parallelism"));
    }

    #[test]
    fn oversized_kdf_is_rejected() {
        let cfg = FacadeConfig {
            kdf: KdfParams {
                memory_cost: crate::kdf::MAX_MEMORY_COST + 1,
                ..KdfParams::default()
            },
            ..FacadeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn swapped_defaults_are_rejected() {
        let cfg = FacadeConfig {
            default_kem: Algorithm::MlDsa65,
            ..FacadeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = FacadeConfig {
            default_signature: Algorithm::SlhDsaSha2_128s,
            audit: false,
            ..FacadeConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(FacadeConfig::load_or_default(&path).unwrap(), cfg);
    }
}
