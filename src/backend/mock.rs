//! The mock backend.
//!
//! Useful for tests and for product demos with no chain access. Connects
//! after an artificial delay and hands out stub read/sign handles built from
//! the configured values.

use std::sync::Arc;
use std::time::Duration;

use async_lock::Mutex;
use async_trait::async_trait;

use crate::connection::{
    Account, ChainReader, ConnectOptions, Connection, ConnectionBackend, Network, Signer,
};
use crate::error::WalletError;
use crate::events::{ConnectionEvent, EventKind, EventListener, ListenerId, Listeners};
use crate::network::{network_name, DEFAULT_CHAIN_ID};

const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(500);

// ─── Options ─────────────────────────────────────────────────────────────────

/// Connect options for the mock backend.
///
/// Unset fields fall back to the last-used options, then the backend
/// defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockOptions {
    pub address: Option<String>,
    pub ens_address: Option<String>,
    pub chain_id: Option<u64>,
    pub network_name: Option<String>,
    /// The account's native token balance, in wei.
    pub eth_balance: Option<u128>,
}

/// Fully resolved mock-backend options.
#[derive(Debug, Clone, PartialEq)]
pub struct MockConfig {
    pub address: String,
    pub ens_address: Option<String>,
    pub chain_id: u64,
    pub network_name: String,
    pub eth_balance: u128,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            address: "0x1111111111111111111111111111111111111111".into(),
            ens_address: Some("user.eth".into()),
            chain_id: DEFAULT_CHAIN_ID,
            network_name: network_name(DEFAULT_CHAIN_ID)
                .unwrap_or("mainnet")
                .into(),
            eth_balance: 0,
        }
    }
}

fn resolve_options(
    call: Option<&MockOptions>,
    cached: Option<&MockConfig>,
    defaults: &MockConfig,
) -> MockConfig {
    MockConfig {
        address: call
            .and_then(|options| options.address.clone())
            .or_else(|| cached.map(|config| config.address.clone()))
            .unwrap_or_else(|| defaults.address.clone()),
        ens_address: call
            .and_then(|options| options.ens_address.clone())
            .or_else(|| cached.and_then(|config| config.ens_address.clone()))
            .or_else(|| defaults.ens_address.clone()),
        chain_id: call
            .and_then(|options| options.chain_id)
            .or(cached.map(|config| config.chain_id))
            .unwrap_or(defaults.chain_id),
        network_name: call
            .and_then(|options| options.network_name.clone())
            .or_else(|| cached.map(|config| config.network_name.clone()))
            .unwrap_or_else(|| defaults.network_name.clone()),
        eth_balance: call
            .and_then(|options| options.eth_balance)
            .or(cached.map(|config| config.eth_balance))
            .unwrap_or(defaults.eth_balance),
    }
}

// ─── Stub handles ────────────────────────────────────────────────────────────

struct MockReader {
    network: Network,
    ens_address: Option<String>,
    eth_balance: u128,
}

#[async_trait]
impl ChainReader for MockReader {
    async fn network(&self) -> Result<Network, WalletError> {
        Ok(self.network.clone())
    }

    async fn balance(&self, _address: &str) -> Result<u128, WalletError> {
        Ok(self.eth_balance)
    }

    async fn lookup_address(&self, _address: &str) -> Result<Option<String>, WalletError> {
        Ok(self.ens_address.clone())
    }
}

struct MockSigner {
    address: String,
}

#[async_trait]
impl Signer for MockSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, WalletError> {
        // a recognizable non-signature, good enough for demos
        Ok(format!("0xmock{:02x}", message.len()))
    }
}

// ─── Backend ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Cache {
    config: Option<MockConfig>,
    connection: Option<Connection>,
}

/// A mock connection backend.
pub struct MockBackend {
    defaults: MockConfig,
    delay: Duration,
    listeners: Listeners,
    cache: Mutex<Cache>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

impl MockBackend {
    pub fn new(defaults: MockConfig) -> Self {
        Self {
            defaults,
            delay: DEFAULT_CONNECT_DELAY,
            listeners: Listeners::new(),
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Override the artificial connect delay (default 500ms).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ConnectionBackend for MockBackend {
    async fn connect(&self, options: Option<ConnectOptions>) -> Result<Connection, WalletError> {
        let call = match options {
            None => None,
            Some(ConnectOptions::Mock(options)) => Some(options),
            Some(other) => {
                return Err(WalletError::Other(format!(
                    "the mock backend cannot use {:?}",
                    other
                )))
            }
        };

        let mut cache = self.cache.lock().await;
        let config = resolve_options(call.as_ref(), cache.config.as_ref(), &self.defaults);

        if let (Some(connection), Some(cached)) = (cache.connection.as_ref(), cache.config.as_ref())
        {
            if *cached == config {
                return Ok(connection.clone());
            }
        }

        // simulate establishing a connection
        tokio::time::sleep(self.delay).await;

        let network = Network {
            name: config.network_name.clone(),
            chain_id: config.chain_id,
            ens_address: None,
        };
        let account = Account {
            address: config.address.clone(),
            ens_address: config.ens_address.clone(),
        };

        let connection = Connection {
            network: network.clone(),
            account: account.clone(),
            accounts: vec![account],
            reader: Arc::new(MockReader {
                network,
                ens_address: config.ens_address.clone(),
                eth_balance: config.eth_balance,
            }),
            signer: Arc::new(MockSigner {
                address: config.address.clone(),
            }),
            wallet: None,
        };

        cache.connection = Some(connection.clone());
        cache.config = Some(config);

        // dispatched after this call returns
        self.listeners
            .dispatch_later(ConnectionEvent::Connect(connection.clone()));

        Ok(connection)
    }

    async fn disconnect(&self, error: Option<WalletError>) -> Result<(), WalletError> {
        if let Some(error) = error.as_ref() {
            tracing::error!(%error, "disconnecting after error");
        }

        self.cache.lock().await.connection = None;

        self.listeners
            .dispatch_later(ConnectionEvent::Disconnect(error));

        Ok(())
    }

    async fn connection(&self) -> Option<Connection> {
        self.cache.lock().await.connection.clone()
    }

    fn listen(&self, kind: EventKind, listener: EventListener) -> ListenerId {
        self.listeners.listen(kind, listener)
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.unlisten(id);
    }
}
