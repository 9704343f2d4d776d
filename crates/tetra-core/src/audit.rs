//! Tamper-evident audit trail of facade operations.
//!
//! JSON lines. Each entry commits to its predecessor through `prev_hash`
//! (SHA-256 over the canonical entry) and carries an Ed25519 signature over
//! its own hash. Message contents and key material never enter the log.
//!
//! Once the live file reaches `max_bytes` it is renamed to `<name>.1` (older
//! rotations shift up, at most `MAX_ROTATIONS` are kept) and a fresh chain
//! starts at `CHAIN_START`. Sequence numbers keep counting across files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

pub const CHAIN_START: &str = "CHAIN_START";
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATIONS: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub algorithm: Option<String>,
    pub outcome: AuditOutcome,
    pub detail: serde_json::Value,
    pub prev_hash: String,
    pub hash: String,
    pub signature: String,
}

impl AuditEntry {
    fn unsigned_value(&self) -> serde_json::Value {
        serde_json::json!({
            "seq": self.seq,
            "timestamp": self.timestamp,
            "operation": self.operation,
            "algorithm": self.algorithm,
            "outcome": self.outcome,
            "detail": self.detail,
            "prev_hash": self.prev_hash,
        })
    }
}

pub struct AuditLog {
    path: PathBuf,
    signer: SigningKey,
    inner: Mutex<LogState>,
    max_bytes: u64,
}

#[derive(Debug)]
struct LogState {
    last_seq: u64,
    last_hash: String,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").field("path", &self.path).finish()
    }
}

impl AuditLog {
    pub fn open<P: AsRef<Path>>(path: P, signer: SigningKey) -> Result<Self, StoreError> {
        Self::with_max_bytes(path, signer, DEFAULT_MAX_BYTES)
    }

    pub fn with_max_bytes<P: AsRef<Path>>(
        path: P,
        signer: SigningKey,
        max_bytes: u64,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let (last_seq, last_hash) = Self::load_state(&path)?;
        Ok(Self {
            path,
            signer,
            inner: Mutex::new(LogState {
                last_seq,
                last_hash,
            }),
            max_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    fn load_state(path: &Path) -> Result<(u64, String), StoreError> {
        if let Some(last) = read_entries(path)?.pop() {
            return Ok((last.seq, last.hash));
        }
        // Fresh file right after a rotation: the chain restarts, the
        // sequence does not.
        let last_seq = read_entries(&rotated_path(path, 1))?
            .last()
            .map_or(0, |e| e.seq);
        Ok((last_seq, CHAIN_START.to_string()))
    }

    /// Caller holds the state lock.
    fn rotate_if_needed(&self, state: &mut LogState) -> Result<(), StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() >= self.max_bytes => {}
            _ => return Ok(()),
        }
        for i in (1..=MAX_ROTATIONS).rev() {
            let rotated = rotated_path(&self.path, i);
            if rotated.exists() {
                if i == MAX_ROTATIONS {
                    fs::remove_file(&rotated)?;
                } else {
                    fs::rename(&rotated, rotated_path(&self.path, i + 1))?;
                }
            }
        }
        fs::rename(&self.path, rotated_path(&self.path, 1))?;
        state.last_hash = CHAIN_START.to_string();
        tracing::info!(path = %self.path.display(), last_seq = state.last_seq, "audit log rotated");
        Ok(())
    }

    fn compute_hash(unsigned: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(unsigned.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn append(
        &self,
        operation: &str,
        algorithm: Option<&str>,
        outcome: AuditOutcome,
        detail: serde_json::Value,
    ) -> Result<AuditEntry, StoreError> {
        let mut state = self.inner.lock();
        self.rotate_if_needed(&mut state)?;
        let mut entry = AuditEntry {
            seq: state.last_seq + 1,
            timestamp: Utc::now(),
            operation: operation.to_string(),
            algorithm: algorithm.map(str::to_string),
            outcome,
            detail,
            prev_hash: state.last_hash.clone(),
            hash: String::new(),
            signature: String::new(),
        };
        entry.hash = Self::compute_hash(&entry.unsigned_value());
        let sig = self.signer.sign(entry.hash.as_bytes());
        entry.signature = general_purpose::STANDARD.encode(sig.to_bytes());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        file.flush()?;

        state.last_seq = entry.seq;
        state.last_hash = entry.hash.clone();
        Ok(entry)
    }

    /// Most recent first, optionally filtered by `since` and capped at `limit`.
    /// Walks into rotated files until the limit is met.
    pub fn read_recent(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for file in log_files(&self.path) {
            let mut entries = read_entries(&file)?;
            entries.reverse();
            out.extend(
                entries
                    .into_iter()
                    .filter(|e| since.map_or(true, |ts| e.timestamp >= ts)),
            );
            if out.len() >= limit {
                break;
            }
        }
        out.truncate(limit);
        Ok(out)
    }
}

fn rotated_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    path.with_file_name(name)
}

/// Live file first, then existing rotations from newest to oldest.
fn log_files(path: &Path) -> Vec<PathBuf> {
    std::iter::once(path.to_path_buf())
        .chain((1..=MAX_ROTATIONS).map(|i| rotated_path(path, i)))
        .filter(|p| p.exists())
        .collect()
}

/// Walk one log file: hashes, links, sequence numbers and signatures.
/// Every file starts its own chain at `CHAIN_START`; the first sequence
/// number is whatever the previous file left off at. Returns the number of
/// verified entries.
pub fn verify_chain(path: &Path, key: &VerifyingKey) -> Result<usize, StoreError> {
    Ok(verify_file(path, key)?.count)
}

/// `verify_chain` over the live file and every retained rotation, also
/// checking that sequence numbers continue from one file to the next.
pub fn verify_all(path: &Path, key: &VerifyingKey) -> Result<usize, StoreError> {
    let mut total = 0;
    let mut newer_first_seq: Option<u64> = None;
    for file in log_files(path) {
        let span = verify_file(&file, key)?;
        if let (Some(next), Some(last)) = (newer_first_seq, span.last_seq) {
            if next != last + 1 {
                return Err(StoreError::Corrupt(format!(
                    "{}: ends at {last}, newer file starts at {next}",
                    file.display()
                )));
            }
        }
        if span.first_seq.is_some() {
            newer_first_seq = span.first_seq;
        }
        total += span.count;
    }
    Ok(total)
}

struct FileSpan {
    count: usize,
    first_seq: Option<u64>,
    last_seq: Option<u64>,
}

fn verify_file(path: &Path, key: &VerifyingKey) -> Result<FileSpan, StoreError> {
    let entries = read_entries(path)?;
    let mut prev = CHAIN_START.to_string();
    let mut expected_seq = None;
    for entry in &entries {
        if entry.prev_hash != prev {
            return Err(StoreError::Corrupt(format!("entry {}: broken link", entry.seq)));
        }
        if let Some(seq) = expected_seq {
            if entry.seq != seq {
                return Err(StoreError::Corrupt(format!(
                    "entry {}: expected sequence {seq}",
                    entry.seq
                )));
            }
        }
        if AuditLog::compute_hash(&entry.unsigned_value()) != entry.hash {
            return Err(StoreError::Corrupt(format!("entry {}: hash mismatch", entry.seq)));
        }
        let sig_bytes = general_purpose::STANDARD
            .decode(&entry.signature)
            .map_err(|e| StoreError::Corrupt(format!("entry {}: signature: {e}", entry.seq)))?;
        let sig = Signature::from_slice(&sig_bytes)
            .map_err(|e| StoreError::Corrupt(format!("entry {}: signature: {e}", entry.seq)))?;
        key.verify_strict(entry.hash.as_bytes(), &sig)
            .map_err(|_| StoreError::Corrupt(format!("entry {}: bad signature", entry.seq)))?;
        prev = entry.hash.clone();
        expected_seq = Some(entry.seq + 1);
    }
    Ok(FileSpan {
        count: entries.len(),
        first_seq: entries.first().map(|e| e.seq),
        last_seq: entries.last().map(|e| e.seq),
    })
}

fn read_entries(path: &Path) -> Result<Vec<AuditEntry>, StoreError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn signer() -> SigningKey {
        SigningKey::generate(&mut rand::rngs::OsRng)
    }

    #[test]
    fn chain_verifies_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let key = signer();
        let vk = key.verifying_key();
        {
            let log = AuditLog::open(&path, key.clone()).unwrap();
            for i in 0..5 {
                let e = log
                    .append("sign", Some("ML-DSA-65"), AuditOutcome::Success, serde_json::json!({"i": i}))
                    .unwrap();
                assert_eq!(e.seq, i + 1);
            }
        }
        let log = AuditLog::open(&path, key).unwrap();
        let e = log
            .append("verify", None, AuditOutcome::Failure, serde_json::Value::Null)
            .unwrap();
        assert_eq!(e.seq, 6);
        assert_eq!(verify_chain(&path, &vk).unwrap(), 6);
    }

    #[test]
    fn edited_entry_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let key = signer();
        let log = AuditLog::open(&path, key.clone()).unwrap();
        log.append("encrypt", Some("ML-KEM-768"), AuditOutcome::Success, serde_json::json!({}))
            .unwrap();
        log.append("decrypt", Some("ML-KEM-768"), AuditOutcome::Failure, serde_json::json!({}))
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replacen("FAILURE", "SUCCESS", 1)).unwrap();
        assert!(matches!(
            verify_chain(&path, &key.verifying_key()),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn foreign_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path, signer()).unwrap();
        log.append("keygen", Some("Ed25519"), AuditOutcome::Success, serde_json::json!({}))
            .unwrap();
        assert!(verify_chain(&path, &signer().verifying_key()).is_err());
    }

    #[test]
    fn read_recent_orders_newest_first() {
        let dir = tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log"), signer()).unwrap();
        for op in ["a", "b", "c"] {
            log.append(op, None, AuditOutcome::Success, serde_json::json!({}))
                .unwrap();
        }
        let recent = log.read_recent(None, Some(2)).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, "c");
        assert_eq!(recent[1].operation, "b");
    }

    #[test]
    fn rotation_restarts_chain_and_keeps_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let key = signer();
        let vk = key.verifying_key();
        let log = AuditLog::with_max_bytes(&path, key.clone(), 1024).unwrap();
        let mut last = 0;
        for i in 0..12 {
            last = log
                .append("sign", Some("Ed25519"), AuditOutcome::Success, serde_json::json!({"i": i}))
                .unwrap()
                .seq;
        }
        assert_eq!(last, 12);
        assert!(dir.path().join("audit.log.1").exists());

        let live = read_entries(&path).unwrap();
        assert_eq!(live[0].prev_hash, CHAIN_START);
        assert!(live[0].seq > 1);
        assert_eq!(verify_chain(&path, &vk).unwrap(), live.len());
        assert_eq!(verify_all(&path, &vk).unwrap(), 12);

        let recent = log.read_recent(None, Some(12)).unwrap();
        let seqs: Vec<u64> = recent.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=12).rev().collect::<Vec<_>>());

        drop(log);
        let reopened = AuditLog::with_max_bytes(&path, key, 1024).unwrap();
        let e = reopened
            .append("verify", None, AuditOutcome::Success, serde_json::json!({}))
            .unwrap();
        assert_eq!(e.seq, 13);
        assert_eq!(verify_all(&path, &vk).unwrap(), 13);
    }

    #[test]
    fn sequence_survives_reopen_right_after_rotation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let key = signer();
        let log = AuditLog::with_max_bytes(&path, key.clone(), 1).unwrap();
        log.append("a", None, AuditOutcome::Success, serde_json::json!({}))
            .unwrap();
        log.append("b", None, AuditOutcome::Success, serde_json::json!({}))
            .unwrap();
        drop(log);
        // Simulate a crash between rotating and writing the next entry.
        fs::rename(&path, dir.path().join("audit.log.tmp")).unwrap();
        fs::rename(dir.path().join("audit.log.1"), dir.path().join("audit.log.2")).unwrap();
        fs::rename(dir.path().join("audit.log.tmp"), dir.path().join("audit.log.1")).unwrap();
        let log = AuditLog::with_max_bytes(&path, key.clone(), 1).unwrap();
        let e = log
            .append("c", None, AuditOutcome::Success, serde_json::json!({}))
            .unwrap();
        assert_eq!(e.seq, 3);
        assert_eq!(e.prev_hash, CHAIN_START);
        assert_eq!(verify_all(&path, &key.verifying_key()).unwrap(), 3);
    }

    #[test]
    fn oldest_rotation_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::with_max_bytes(&path, signer(), 1).unwrap();
        for _ in 0..(MAX_ROTATIONS + 3) {
            log.append("x", None, AuditOutcome::Success, serde_json::json!({}))
                .unwrap();
        }
        assert!(dir.path().join(format!("audit.log.{MAX_ROTATIONS}")).exists());
        assert!(!dir.path().join(format!("audit.log.{}", MAX_ROTATIONS + 1)).exists());
        assert_eq!(log_files(&path).len(), MAX_ROTATIONS + 1);
    }
}
