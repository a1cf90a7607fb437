//! The injected-wallet backend.
//!
//! Connecting means: discover the available wallets, resolve the one the
//! stored identity points at, make sure it is on the requested chain
//! (switching if necessary), request account access, and hand out the
//! connection. On top of that the backend absorbs the event-sequence quirks
//! some wallets exhibit around chain switches, so consumers see one uniform
//! event surface.

pub mod discovery;
pub mod identity;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use async_lock::Mutex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::connection::{
    Account, ChainReader, ConnectOptions, Connection, ConnectionBackend, Signer,
};
use crate::error::WalletError;
use crate::events::{ConnectionEvent, EventKind, EventListener, ListenerId, Listeners};
use crate::network::DEFAULT_CHAIN_ID;

use discovery::{DiscoveryBus, ProviderDetail};
use identity::{identities_match, WalletIdentity};
use transport::{InjectedProvider, ProviderEvent};

/// Disconnect code some wallets emit mid chain-switch. Not a genuine
/// disconnect — the wallet reconnects on its own and follows up with a
/// `chainChanged` event (observed with MetaMask: "Disconnected from chain.
/// Attempting to connect.").
const CHAIN_SWITCH_DISCONNECT_CODE: i64 = 1013;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Connect options for the injected backend.
///
/// Unset fields fall back to the last-used options, then the backend
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectedOptions {
    pub chain_id: Option<u64>,
    /// Identity of the wallet to connect to, used to pick one when several
    /// are available.
    pub identity: Option<WalletIdentity>,
}

/// Fully resolved injected-backend options.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedConfig {
    pub chain_id: u64,
    pub identity: Option<WalletIdentity>,
}

impl Default for InjectedConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            identity: None,
        }
    }
}

/// Field-wise merge: explicit call options win over the last-used options,
/// which win over the defaults.
fn resolve_options(
    call: Option<&InjectedOptions>,
    cached: Option<&InjectedConfig>,
    defaults: &InjectedConfig,
) -> InjectedConfig {
    InjectedConfig {
        chain_id: call
            .and_then(|options| options.chain_id)
            .or(cached.map(|config| config.chain_id))
            .unwrap_or(defaults.chain_id),
        identity: call
            .and_then(|options| options.identity.clone())
            .or_else(|| cached.and_then(|config| config.identity.clone()))
            .or_else(|| defaults.identity.clone()),
    }
}

// ─── Collaborator seams ──────────────────────────────────────────────────────

/// Builds [`ChainReader`]s over a live provider handle.
///
/// This keeps chain-RPC internals (network metadata, balance and ENS
/// queries over the wallet transport) outside the core.
pub trait ReaderFactory: Send + Sync {
    fn wrap(&self, provider: Arc<dyn InjectedProvider>, chain_id: u64) -> Arc<dyn ChainReader>;
}

/// Signer that forwards `personal_sign` requests to the wallet.
struct InjectedSigner {
    provider: Arc<dyn InjectedProvider>,
    address: String,
}

#[async_trait]
impl Signer for InjectedSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, WalletError> {
        let mut hex_message = String::with_capacity(2 + message.len() * 2);
        hex_message.push_str("0x");
        for byte in message {
            hex_message.push_str(&format!("{:02x}", byte));
        }

        let value = self
            .provider
            .request("personal_sign", json!([hex_message, self.address]))
            .await?;

        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| WalletError::Other(format!("malformed signature: {}", value)))
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Cache {
    config: Option<InjectedConfig>,
    connection: Option<Connection>,
    /// One-shot flag armed by the chain-switch disconnect quirk; the next
    /// raw connect event consumes it.
    switch_reconnect: bool,
    /// The raw-event pump for the current connection.
    pump: Option<JoinHandle<()>>,
}

struct Inner {
    defaults: InjectedConfig,
    bus: Arc<DiscoveryBus>,
    readers: Arc<dyn ReaderFactory>,
    switch_timeout: Option<Duration>,
    listeners: Listeners,
    cache: Mutex<Cache>,
}

/// A connection backend over a browser-injected wallet provider.
#[derive(Clone)]
pub struct InjectedBackend {
    inner: Arc<Inner>,
}

impl InjectedBackend {
    pub fn builder() -> InjectedBackendBuilder {
        InjectedBackendBuilder::default()
    }

    async fn connect_impl(
        &self,
        call: Option<InjectedOptions>,
    ) -> Result<Connection, WalletError> {
        let inner = &self.inner;
        let mut cache = inner.cache.lock().await;

        let mut config = resolve_options(call.as_ref(), cache.config.as_ref(), &inner.defaults);

        // a redundant connect with matching options short-circuits before
        // any discovery or chain work
        if let Some(connection) = cached_connection(&cache, &config) {
            return Ok(connection);
        }

        let wallet = self.resolve_provider(&config).await?;

        // recompute the identity from the live wallet, so later exact
        // comparisons use the current volatile fields
        config.identity = Some(wallet.identity());

        if let Some(connection) = cached_connection(&cache, &config) {
            return Ok(connection);
        }

        let provider = Arc::clone(&wallet.provider);

        // make sure the wallet is on the requested chain
        let current = transport::chain_id(provider.as_ref()).await?;
        if current != config.chain_id {
            if let Err(error) =
                transport::switch_chain(provider.as_ref(), config.chain_id, inner.switch_timeout)
                    .await
            {
                tracing::error!(%error, chain_id = config.chain_id, "chain switch failed");
                return Err(WalletError::NetworkMismatch {
                    chain_id: config.chain_id,
                });
            }
        }

        let addresses = transport::request_accounts(provider.as_ref()).await?;
        if addresses.is_empty() {
            return Err(WalletError::Provider {
                code: 4100,
                message: "the wallet returned no accounts".into(),
            });
        }

        let reader = inner.readers.wrap(Arc::clone(&provider), config.chain_id);
        let network = reader.network().await?;

        let mut accounts = Vec::with_capacity(addresses.len());
        for address in addresses {
            let ens_address = match reader.lookup_address(&address).await {
                Ok(name) => name,
                Err(error) => {
                    // best effort — a failed lookup just leaves the name empty
                    tracing::warn!(%address, %error, "ENS lookup failed");
                    None
                }
            };
            accounts.push(Account {
                address,
                ens_address,
            });
        }
        let account = accounts[0].clone();

        let signer: Arc<dyn Signer> = Arc::new(InjectedSigner {
            provider: Arc::clone(&provider),
            address: account.address.clone(),
        });

        let connection = Connection {
            network,
            account,
            accounts,
            reader,
            signer,
            wallet: Some(wallet),
        };

        cache.connection = Some(connection.clone());
        cache.config = Some(config);
        self.start_event_pump(&mut cache, provider);

        // dispatched after this call returns
        inner
            .listeners
            .dispatch_later(ConnectionEvent::Connect(connection.clone()));

        Ok(connection)
    }

    async fn disconnect_impl(&self, error: Option<WalletError>) -> Result<(), WalletError> {
        if let Some(error) = error.as_ref() {
            tracing::error!(%error, "disconnecting after provider error");
        }

        let mut cache = self.inner.cache.lock().await;
        if let Some(pump) = cache.pump.take() {
            pump.abort();
        }
        // the last-used options stay cached for the next connect
        cache.connection = None;
        drop(cache);

        self.inner
            .listeners
            .dispatch_later(ConnectionEvent::Disconnect(error));

        Ok(())
    }

    /// Resolve the wallet to connect to from the discovered set.
    async fn resolve_provider(
        &self,
        config: &InjectedConfig,
    ) -> Result<ProviderDetail, WalletError> {
        let mut providers = self.inner.bus.discover().await;

        match providers.len() {
            0 => Err(WalletError::WalletUnavailable),
            // a single wallet is used regardless of the stored identity
            1 => Ok(providers.remove(0)),
            _ => identity::select_provider(&providers, config.identity.as_ref())
                .cloned()
                .ok_or(WalletError::WalletUnspecified),
        }
    }

    fn start_event_pump(&self, cache: &mut Cache, provider: Arc<dyn InjectedProvider>) {
        if let Some(pump) = cache.pump.take() {
            pump.abort();
        }

        let mut events = provider.events();
        let weak = Arc::downgrade(&self.inner);

        cache.pump = Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "provider event stream lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                match weak.upgrade() {
                    Some(inner) => InjectedBackend { inner }.handle_provider_event(event).await,
                    None => break,
                }
            }
        }));
    }

    async fn handle_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::Connect { .. } => self.handle_raw_connect().await,
            ProviderEvent::Disconnect { code, message } => {
                self.handle_raw_disconnect(code, message).await;
            }
            ProviderEvent::ChainChanged { chain_id } => {
                match transport::parse_chain_id(&chain_id) {
                    Some(chain_id) => self
                        .inner
                        .listeners
                        .dispatch(&ConnectionEvent::ChainChanged(chain_id)),
                    None => tracing::warn!(%chain_id, "ignoring malformed chainChanged event"),
                }
            }
            ProviderEvent::AccountsChanged { accounts } => self
                .inner
                .listeners
                .dispatch(&ConnectionEvent::AccountsChanged(accounts)),
        }
    }

    /// Raw connect events while we're already connected are spurious — some
    /// wallets emit one when the user switches chains. The default handling
    /// is to tear down and transparently re-establish the connection, unless
    /// the chain-switch disconnect quirk was just observed, in which case the
    /// event belongs to the switch and gets swallowed (the following
    /// `chainChanged` is the switch's only visible signal).
    async fn handle_raw_connect(&self) {
        {
            let mut cache = self.inner.cache.lock().await;
            if cache.connection.is_none() {
                return;
            }
            if cache.switch_reconnect {
                cache.switch_reconnect = false;
                return;
            }
        }

        // re-establish on a detached task — disconnecting aborts the event
        // pump, and this handler runs on it
        let backend = self.clone();
        tokio::spawn(async move {
            let _ = backend.disconnect_impl(None).await;
            if let Err(error) = backend.connect_impl(None).await {
                tracing::warn!(%error, "reconnect after spurious connect event failed");
            }
        });
    }

    async fn handle_raw_disconnect(&self, code: i64, message: String) {
        if code == CHAIN_SWITCH_DISCONNECT_CODE {
            // suppress: the wallet reconnects on its own; arm the one-shot
            // flag so the reconnect's connect event is swallowed too
            let mut cache = self.inner.cache.lock().await;
            cache.switch_reconnect = true;
            return;
        }

        // any other code is a genuine disconnect
        let error = WalletError::Provider { code, message };
        let backend = self.clone();
        tokio::spawn(async move {
            let _ = backend.disconnect_impl(Some(error)).await;
        });
    }
}

/// The cached connection, if the cache holds one matching `config` on
/// `(chain_id, exact identity)`.
fn cached_connection(cache: &Cache, config: &InjectedConfig) -> Option<Connection> {
    let connection = cache.connection.as_ref()?;
    let cached = cache.config.as_ref()?;

    let cache_hit = cached.chain_id == config.chain_id
        && identities_match(cached.identity.as_ref(), config.identity.as_ref(), true);

    cache_hit.then(|| connection.clone())
}

#[async_trait]
impl ConnectionBackend for InjectedBackend {
    async fn connect(&self, options: Option<ConnectOptions>) -> Result<Connection, WalletError> {
        let options = match options {
            None => None,
            Some(ConnectOptions::Injected(options)) => Some(options),
            Some(other) => {
                return Err(WalletError::Other(format!(
                    "the injected backend cannot use {:?}",
                    other
                )))
            }
        };
        self.connect_impl(options).await
    }

    async fn disconnect(&self, error: Option<WalletError>) -> Result<(), WalletError> {
        self.disconnect_impl(error).await
    }

    async fn connection(&self) -> Option<Connection> {
        self.inner.cache.lock().await.connection.clone()
    }

    fn listen(&self, kind: EventKind, listener: EventListener) -> ListenerId {
        self.inner.listeners.listen(kind, listener)
    }

    fn unlisten(&self, id: ListenerId) {
        self.inner.listeners.unlisten(id);
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InjectedBackendBuilder {
    bus: Option<Arc<DiscoveryBus>>,
    readers: Option<Arc<dyn ReaderFactory>>,
    defaults: Option<InjectedConfig>,
    switch_timeout: Option<Duration>,
}

impl InjectedBackendBuilder {
    /// The discovery bus wallets announce themselves on. Required.
    pub fn bus(mut self, bus: Arc<DiscoveryBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The chain-reader factory. Required.
    pub fn readers(mut self, readers: Arc<dyn ReaderFactory>) -> Self {
        self.readers = Some(readers);
        self
    }

    /// Default options used when neither the call nor the cache provides a
    /// value.
    pub fn defaults(mut self, defaults: InjectedConfig) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Bound the wait for chain-switch confirmation. Unbounded by default,
    /// since the confirmation depends on the user acting in the wallet UI.
    pub fn switch_timeout(mut self, timeout: Duration) -> Self {
        self.switch_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<InjectedBackend, WalletError> {
        let bus = self
            .bus
            .ok_or_else(|| WalletError::Other("a discovery bus is required".into()))?;
        let readers = self
            .readers
            .ok_or_else(|| WalletError::Other("a reader factory is required".into()))?;

        Ok(InjectedBackend {
            inner: Arc::new(Inner {
                defaults: self.defaults.unwrap_or_default(),
                bus,
                readers,
                switch_timeout: self.switch_timeout,
                listeners: Listeners::new(),
                cache: Mutex::new(Cache::default()),
            }),
        })
    }
}
