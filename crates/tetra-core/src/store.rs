//! Profile persistence.
//!
//! Stores are opened by their own constructors (`init` creates, `open` loads)
//! and closed with `teardown`; after teardown every call fails with
//! `StoreError::Closed`.

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::profile::UserProfile;

pub trait ProfileStore {
    fn load(&self, username: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Insert or replace the profile keyed by its username.
    fn save(&mut self, profile: &UserProfile) -> Result<(), StoreError>;

    /// Returns whether a profile was removed.
    fn delete(&mut self, username: &str) -> Result<bool, StoreError>;

    fn usernames(&self) -> Result<Vec<String>, StoreError>;

    fn teardown(&mut self) -> Result<(), StoreError>;

    fn load_required(&self, username: &str) -> Result<UserProfile, StoreError> {
        self.load(username)?
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: BTreeMap<String, UserProfile>,
    closed: bool,
}

impl MemoryProfileStore {
    pub fn init() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, username: &str) -> Result<Option<UserProfile>, StoreError> {
        self.ensure_open()?;
        Ok(self.profiles.get(username).cloned())
    }

    fn save(&mut self, profile: &UserProfile) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.profiles
            .insert(profile.username.clone(), profile.clone());
        Ok(())
    }

    fn delete(&mut self, username: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.profiles.remove(username).is_some())
    }

    fn usernames(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        Ok(self.profiles.keys().cloned().collect())
    }

    fn teardown(&mut self) -> Result<(), StoreError> {
        self.profiles.clear();
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Algorithm;
    use crate::profile::ProfileSettings;

    fn profile(name: &str) -> UserProfile {
        UserProfile::register(
            name,
            "",
            &format!("{name}@example.com"),
            ProfileSettings {
                default_signature: Algorithm::Ed25519,
                ..ProfileSettings::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn save_load_delete() {
        let mut store = MemoryProfileStore::init();
        store.save(&profile("alice")).unwrap();
        store.save(&profile("bob")).unwrap();
        assert_eq!(store.usernames().unwrap(), vec!["alice", "bob"]);
        assert_eq!(store.load("alice").unwrap().unwrap().username, "alice");
        assert!(store.delete("alice").unwrap());
        assert!(!store.delete("alice").unwrap());
        assert!(matches!(
            store.load_required("alice"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn closed_store_refuses_calls() {
        let mut store = MemoryProfileStore::init();
        store.save(&profile("carol")).unwrap();
        store.teardown().unwrap();
        assert!(matches!(store.load("carol"), Err(StoreError::Closed)));
    }
}
