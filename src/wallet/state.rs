//! Wallet state and state-snapshot subscriptions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::Connection;
use crate::error::WalletError;

/// The wallet status, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletStatus {
    Disconnected,
    Connecting,
    Disconnecting,
    Connected,
    Error,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Disconnecting => "disconnecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The wallet state.
///
/// Payload presence is tied to the status by construction: a connection
/// exists exactly in `Connected`, an error exactly in `Error`. Consumers
/// only ever hold cloned snapshots — the canonical value lives inside the
/// wallet service.
#[derive(Debug, Clone, Default)]
pub enum WalletState {
    #[default]
    Disconnected,
    Connecting,
    Disconnecting,
    Connected(Connection),
    Error(WalletError),
}

impl WalletState {
    pub fn status(&self) -> WalletStatus {
        match self {
            Self::Disconnected => WalletStatus::Disconnected,
            Self::Connecting => WalletStatus::Connecting,
            Self::Disconnecting => WalletStatus::Disconnecting,
            Self::Connected(_) => WalletStatus::Connected,
            Self::Error(_) => WalletStatus::Error,
        }
    }

    /// The connection, when connected.
    pub fn connection(&self) -> Option<&Connection> {
        match self {
            Self::Connected(connection) => Some(connection),
            _ => None,
        }
    }

    /// The error, when in the error state.
    pub fn error(&self) -> Option<&WalletError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}

// ─── Snapshot subscriptions ──────────────────────────────────────────────────

/// A state-snapshot subscriber.
pub type StateObserver = Arc<dyn Fn(&WalletState) + Send + Sync>;

/// Handle for removing a subscriber from an [`Observers`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// Registry of state-snapshot subscribers.
#[derive(Default)]
pub(crate) struct Observers {
    seq: AtomicU64,
    entries: Mutex<Vec<(ObserverId, StateObserver)>>,
}

impl Observers {
    pub fn subscribe(&self, observer: StateObserver) -> ObserverId {
        let id = ObserverId(self.seq.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .expect("observer registry poisoned")
            .push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.entries
            .lock()
            .expect("observer registry poisoned")
            .retain(|(entry_id, _)| *entry_id != id);
    }

    /// Deliver a snapshot to every subscriber.
    pub fn notify(&self, snapshot: &WalletState) {
        let observers: Vec<StateObserver> = self
            .entries
            .lock()
            .expect("observer registry poisoned")
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(snapshot);
        }
    }
}
