//! Wallet preferences — remembering the last-used wallet across sessions.
//!
//! Persistence itself is an external collaborator: anything exposing
//! get/set/delete can back the [`PreferenceStore`] trait (browser local
//! storage, a config file, a database row). [`WalletPreferences`] layers the
//! two values this SDK cares about on top: the last-used wallet identity and
//! the auto-connect flag.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::injected::identity::WalletIdentity;

/// Storage key for the last-used wallet identity.
pub const WALLET_IDENTITY_KEY: &str = "walletIdentifier";

/// Storage key for the auto-connect flag.
pub const AUTO_CONNECT_KEY: &str = "autoConnect";

/// A persistent key-value store.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn delete(&self, key: &str);
}

/// Typed access to the wallet preferences in a [`PreferenceStore`].
#[derive(Clone)]
pub struct WalletPreferences {
    store: Arc<dyn PreferenceStore>,
}

impl WalletPreferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// The remembered wallet identity, if one is stored and parseable.
    ///
    /// The stored `uuid` is stale by definition — it only ever produces a
    /// fuzzy match against freshly discovered wallets.
    pub fn wallet_identity(&self) -> Option<WalletIdentity> {
        let raw = self.store.get(WALLET_IDENTITY_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(error) => {
                tracing::warn!(%error, "discarding unreadable stored wallet identity");
                None
            }
        }
    }

    /// Remember `identity` as the last-used wallet.
    pub fn set_wallet_identity(&self, identity: &WalletIdentity) {
        match serde_json::to_string(identity) {
            Ok(raw) => self.store.set(WALLET_IDENTITY_KEY, raw),
            Err(error) => tracing::warn!(%error, "failed to serialize wallet identity"),
        }
    }

    pub fn clear_wallet_identity(&self) {
        self.store.delete(WALLET_IDENTITY_KEY);
    }

    /// Whether the application should connect on startup.
    pub fn auto_connect(&self) -> bool {
        self.store
            .get(AUTO_CONNECT_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(false)
    }

    /// Set or clear the auto-connect flag. Clearing deletes the key.
    pub fn set_auto_connect(&self, auto_connect: bool) {
        if auto_connect {
            self.store.set(AUTO_CONNECT_KEY, "true".into());
        } else {
            self.store.delete(AUTO_CONNECT_KEY);
        }
    }
}

/// An in-memory [`PreferenceStore`], mainly for tests and demos.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("preference store poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .expect("preference store poisoned")
            .insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.entries
            .lock()
            .expect("preference store poisoned")
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preferences() -> WalletPreferences {
        WalletPreferences::new(Arc::new(MemoryPreferenceStore::new()))
    }

    fn identity() -> WalletIdentity {
        WalletIdentity {
            name: "Wallet".into(),
            rdns: "com.wallet".into(),
            uuid: "session-uuid".into(),
        }
    }

    #[test]
    fn test_wallet_identity_round_trip() {
        let preferences = preferences();

        assert_eq!(preferences.wallet_identity(), None);
        preferences.set_wallet_identity(&identity());
        assert_eq!(preferences.wallet_identity(), Some(identity()));

        preferences.clear_wallet_identity();
        assert_eq!(preferences.wallet_identity(), None);
    }

    #[test]
    fn test_unreadable_identity_discarded() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.set(WALLET_IDENTITY_KEY, "{not json".into());

        let preferences = WalletPreferences::new(store);
        assert_eq!(preferences.wallet_identity(), None);
    }

    #[test]
    fn test_auto_connect_flag() {
        let preferences = preferences();

        assert!(!preferences.auto_connect());
        preferences.set_auto_connect(true);
        assert!(preferences.auto_connect());

        preferences.set_auto_connect(false);
        assert!(!preferences.auto_connect());
    }
}
