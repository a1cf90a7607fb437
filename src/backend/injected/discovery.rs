//! Provider discovery — a broadcast/announce handshake enumerating the
//! injected wallets currently available.
//!
//! Wallet integrations register an announcer on a [`DiscoveryBus`]; each
//! [`DiscoveryBus::discover`] call broadcasts a request, collects the
//! announcements that arrive within one scheduling tick, and returns a fresh
//! result set. Nothing accumulates across calls.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::identity::WalletIdentity;
use super::transport::InjectedProvider;

/// The announce payload describing a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Volatile per-session id — wallets mint a fresh one for every
    /// registration, so it never survives a reload.
    pub uuid: String,
    pub name: String,
    pub rdns: String,
    /// Data URI of the wallet icon.
    pub icon: String,
}

impl ProviderInfo {
    /// Build an announce payload with a freshly minted session uuid.
    pub fn new(name: impl Into<String>, rdns: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            name: name.into(),
            rdns: rdns.into(),
            icon: icon.into(),
        }
    }
}

/// One discovered wallet: its announce payload and the provider handle.
#[derive(Clone)]
pub struct ProviderDetail {
    pub info: ProviderInfo,
    pub provider: Arc<dyn InjectedProvider>,
}

impl ProviderDetail {
    pub fn new(info: ProviderInfo, provider: Arc<dyn InjectedProvider>) -> Self {
        Self { info, provider }
    }

    /// The identity of this wallet, derived from the live announce payload.
    pub fn identity(&self) -> WalletIdentity {
        WalletIdentity {
            name: self.info.name.clone(),
            rdns: self.info.rdns.clone(),
            uuid: self.info.uuid.clone(),
        }
    }
}

impl PartialEq for ProviderDetail {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info && Arc::ptr_eq(&self.provider, &other.provider)
    }
}

impl fmt::Debug for ProviderDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDetail")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Handle announcers use to publish a wallet during a discovery request.
#[derive(Clone)]
pub struct AnnounceSink {
    tx: mpsc::UnboundedSender<ProviderDetail>,
}

impl AnnounceSink {
    /// Announce a wallet. Announcements after the collection window closes
    /// are dropped.
    pub fn announce(&self, detail: ProviderDetail) {
        let _ = self.tx.send(detail);
    }
}

type Announcer = Arc<dyn Fn(AnnounceSink) + Send + Sync>;

/// Handle for removing an announcer from a [`DiscoveryBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnouncerId(u64);

/// The discovery broadcast bus.
#[derive(Default)]
pub struct DiscoveryBus {
    seq: AtomicU64,
    announcers: Mutex<Vec<(AnnouncerId, Announcer)>>,
}

impl DiscoveryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wallet announcer, invoked on every discovery request.
    pub fn on_request(
        &self,
        announcer: impl Fn(AnnounceSink) + Send + Sync + 'static,
    ) -> AnnouncerId {
        let id = AnnouncerId(self.seq.fetch_add(1, Ordering::Relaxed));
        self.announcers
            .lock()
            .expect("announcer registry poisoned")
            .push((id, Arc::new(announcer)));
        id
    }

    /// Remove a registered announcer. Unknown ids are ignored.
    pub fn remove(&self, id: AnnouncerId) {
        self.announcers
            .lock()
            .expect("announcer registry poisoned")
            .retain(|(entry_id, _)| *entry_id != id);
    }

    /// Broadcast a discovery request and collect the wallets announced
    /// within one scheduling tick.
    ///
    /// Announcers usually answer synchronously, but we wait a tick before
    /// draining so ones that answer from a task still make the window.
    pub async fn discover(&self) -> Vec<ProviderDetail> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = AnnounceSink { tx };

        let announcers: Vec<Announcer> = self
            .announcers
            .lock()
            .expect("announcer registry poisoned")
            .iter()
            .map(|(_, announcer)| Arc::clone(announcer))
            .collect();

        for announcer in announcers {
            announcer(sink.clone());
        }

        drop(sink);
        tokio::task::yield_now().await;

        let mut providers = Vec::new();
        while let Ok(detail) = rx.try_recv() {
            providers.push(detail);
        }
        providers
    }
}
