//! Key age monitoring.
//!
//! `check_profile` is a pure function over a profile snapshot; `spawn_monitor`
//! runs it periodically against whatever the profile source returns.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::algorithm::{Algorithm, KeyKind};
use crate::error::StoreError;
use crate::profile::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyStatus {
    Healthy { age_days: i64 },
    RotationDue { age_days: i64 },
    Missing,
}

impl KeyStatus {
    pub fn needs_attention(&self) -> bool {
        !matches!(self, KeyStatus::Healthy { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySlotReport {
    pub kind: KeyKind,
    pub algorithm: Option<Algorithm>,
    pub fingerprint: Option<String>,
    #[serde(flatten)]
    pub status: KeyStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStatusReport {
    pub username: String,
    pub checked_at: DateTime<Utc>,
    pub rotation_interval_days: u32,
    pub slots: Vec<KeySlotReport>,
}

impl KeyStatusReport {
    pub fn needs_attention(&self) -> bool {
        self.slots.iter().any(|s| s.status.needs_attention())
    }
}

pub fn check_profile(profile: &UserProfile, now: DateTime<Utc>) -> KeyStatusReport {
    let interval = i64::from(profile.settings.rotation_interval_days);
    let slots = [KeyKind::Kem, KeyKind::Signature]
        .into_iter()
        .map(|kind| match profile.key_pair(kind) {
            None => KeySlotReport {
                kind,
                algorithm: None,
                fingerprint: None,
                status: KeyStatus::Missing,
            },
            Some(kp) => {
                let age_days = kp.age_days(now);
                let status = if age_days >= interval {
                    KeyStatus::RotationDue { age_days }
                } else {
                    KeyStatus::Healthy { age_days }
                };
                KeySlotReport {
                    kind,
                    algorithm: Some(kp.algorithm),
                    fingerprint: Some(kp.fingerprint()),
                    status,
                }
            }
        })
        .collect();
    KeyStatusReport {
        username: profile.username.clone(),
        checked_at: now,
        rotation_interval_days: profile.settings.rotation_interval_days,
        slots,
    }
}

/// Lets the owner trigger an immediate check or stop the loop.
pub struct MonitorHandle {
    pub wake: Arc<Notify>,
    /// Send `true` to shut down.
    pub shutdown_tx: watch::Sender<bool>,
}

impl MonitorHandle {
    pub fn check_now(&self) {
        self.wake.notify_one();
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub type ProfileSource = Arc<dyn Fn() -> Result<Vec<UserProfile>, StoreError> + Send + Sync>;

/// Spawn the monitor as a tokio task. The first check runs immediately.
/// Source errors are logged and the loop keeps going.
pub fn spawn_monitor<F>(
    source: ProfileSource,
    interval: Duration,
    on_report: F,
) -> (tokio::task::JoinHandle<()>, MonitorHandle)
where
    F: Fn(Vec<KeyStatusReport>) + Send + Sync + 'static,
{
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let wake_clone = wake.clone();

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "key monitor started");
        let mut first = true;
        loop {
            if !first {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = wake_clone.notified() => {
                        debug!("key monitor woken early");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            info!("key monitor handle dropped, stopping");
                            return;
                        }
                    }
                }
            }
            first = false;

            if *shutdown_rx.borrow() {
                info!("key monitor shutting down");
                return;
            }

            let profiles = match (source)() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "key monitor: profile source failed");
                    continue;
                }
            };
            let now = Utc::now();
            let reports: Vec<KeyStatusReport> =
                profiles.iter().map(|p| check_profile(p, now)).collect();
            let flagged = reports.iter().filter(|r| r.needs_attention()).count();
            if flagged > 0 {
                warn!(profiles = reports.len(), flagged, "key monitor: rotation needed");
            } else {
                debug!(profiles = reports.len(), "key monitor: all keys healthy");
            }
            on_report(reports);
        }
    });

    (handle, MonitorHandle { wake, shutdown_tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileSettings;
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;

    fn profile(name: &str) -> UserProfile {
        UserProfile::register(
            name,
            "",
            &format!("{name}@example.com"),
            ProfileSettings {
                rotation_interval_days: 30,
                default_signature: Algorithm::Ed25519,
                ..ProfileSettings::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn fresh_profile_is_healthy() {
        let report = check_profile(&profile("alice"), Utc::now());
        assert!(!report.needs_attention());
        assert_eq!(report.slots.len(), 2);
        assert_eq!(report.slots[0].status, KeyStatus::Healthy { age_days: 0 });
    }

    #[test]
    fn old_and_missing_keys_are_flagged() {
        let mut p = profile("bob");
        p.key_pairs.signature = None;
        let report = check_profile(&p, Utc::now() + ChronoDuration::days(31));
        assert_eq!(report.slots[0].status, KeyStatus::RotationDue { age_days: 31 });
        assert_eq!(report.slots[1].status, KeyStatus::Missing);
        assert!(report.needs_attention());
    }

    #[test]
    fn status_serialises_tagged() {
        let v = serde_json::to_value(KeyStatus::RotationDue { age_days: 4 }).unwrap();
        assert_eq!(v["status"], "rotation_due");
        assert_eq!(v["age_days"], 4);
    }

    #[tokio::test]
    async fn monitor_reports_and_survives_source_errors() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls_src = Arc::clone(&calls);
        let source: ProfileSource = Arc::new(move || {
            let mut n = calls_src.lock();
            *n += 1;
            if *n == 1 {
                Err(StoreError::Closed)
            } else {
                Ok(vec![profile("carol")])
            }
        });
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (task, handle) = spawn_monitor(source, Duration::from_secs(3600), move |r| {
            let _ = tx.send(r);
        });

        // First tick hits the failing source; wake for a second one.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.check_now();
        let reports = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reports[0].username, "carol");
        assert_eq!(*calls.lock(), 2);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
