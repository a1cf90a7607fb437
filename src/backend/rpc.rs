//! The RPC+private-key backend.
//!
//! Useful outside the browser, where no injected wallet exists. The actual
//! JSON-RPC transport and key handling live behind the [`RpcConnector`]
//! collaborator; this backend owns option merging, the connection cache and
//! the event contract.

use std::fmt;
use std::sync::Arc;

use async_lock::Mutex;
use async_trait::async_trait;

use crate::connection::{
    Account, ChainReader, ConnectOptions, Connection, ConnectionBackend, Network, Signer,
};
use crate::error::WalletError;
use crate::events::{ConnectionEvent, EventKind, EventListener, ListenerId, Listeners};
use crate::network::network_name;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Connect options for the RPC backend.
///
/// Unset fields fall back to the last-used options, then the backend
/// defaults.
#[derive(Clone, Default, PartialEq)]
pub struct RpcOptions {
    pub url: Option<String>,
    pub chain_id: Option<u64>,
    pub private_key: Option<String>,
}

impl fmt::Debug for RpcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcOptions")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Fully resolved RPC-backend options.
#[derive(Clone, PartialEq)]
pub struct RpcConfig {
    pub url: String,
    pub chain_id: u64,
    pub private_key: String,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>, chain_id: u64, private_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chain_id,
            private_key: private_key.into(),
        }
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn resolve_options(
    call: Option<&RpcOptions>,
    cached: Option<&RpcConfig>,
    defaults: &RpcConfig,
) -> RpcConfig {
    RpcConfig {
        url: call
            .and_then(|options| options.url.clone())
            .or_else(|| cached.map(|config| config.url.clone()))
            .unwrap_or_else(|| defaults.url.clone()),
        chain_id: call
            .and_then(|options| options.chain_id)
            .or(cached.map(|config| config.chain_id))
            .unwrap_or(defaults.chain_id),
        private_key: call
            .and_then(|options| options.private_key.clone())
            .or_else(|| cached.map(|config| config.private_key.clone()))
            .unwrap_or_else(|| defaults.private_key.clone()),
    }
}

// ─── Collaborator seam ───────────────────────────────────────────────────────

/// An open RPC session: the read handle plus the signer derived from the
/// configured private key.
pub struct RpcSession {
    pub reader: Arc<dyn ChainReader>,
    pub signer: Arc<dyn Signer>,
}

/// Opens JSON-RPC sessions. Keeps transport and key handling outside the
/// core.
#[async_trait]
pub trait RpcConnector: Send + Sync {
    async fn open(&self, config: &RpcConfig) -> Result<RpcSession, WalletError>;
}

// ─── Backend ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Cache {
    config: Option<RpcConfig>,
    connection: Option<Connection>,
}

/// A connection backend over an RPC endpoint and a private key.
pub struct RpcBackend {
    defaults: RpcConfig,
    connector: Arc<dyn RpcConnector>,
    listeners: Listeners,
    cache: Mutex<Cache>,
}

impl RpcBackend {
    pub fn new(defaults: RpcConfig, connector: Arc<dyn RpcConnector>) -> Self {
        Self {
            defaults,
            connector,
            listeners: Listeners::new(),
            cache: Mutex::new(Cache::default()),
        }
    }
}

#[async_trait]
impl ConnectionBackend for RpcBackend {
    async fn connect(&self, options: Option<ConnectOptions>) -> Result<Connection, WalletError> {
        let call = match options {
            None => None,
            Some(ConnectOptions::Rpc(options)) => Some(options),
            Some(other) => {
                return Err(WalletError::Other(format!(
                    "the RPC backend cannot use {:?}",
                    other
                )))
            }
        };

        let mut cache = self.cache.lock().await;
        let config = resolve_options(call.as_ref(), cache.config.as_ref(), &self.defaults);

        // a redundant connect with matching options returns the cached
        // connection unchanged
        if let (Some(connection), Some(cached)) = (cache.connection.as_ref(), cache.config.as_ref())
        {
            if *cached == config {
                return Ok(connection.clone());
            }
        }

        let session = self.connector.open(&config).await?;

        // the endpoint may not support the network query — fall back to what
        // we already know about the chain
        let network = match session.reader.network().await {
            Ok(network) => network,
            Err(error) => {
                tracing::warn!(%error, chain_id = config.chain_id, "network lookup failed");
                Network {
                    name: network_name(config.chain_id).unwrap_or("unknown").into(),
                    chain_id: config.chain_id,
                    ens_address: None,
                }
            }
        };

        let address = session.signer.address().to_string();
        let ens_address = match session.reader.lookup_address(&address).await {
            Ok(name) => name,
            Err(error) => {
                tracing::warn!(%address, %error, "ENS lookup failed");
                None
            }
        };

        let account = Account {
            address,
            ens_address,
        };

        let connection = Connection {
            network,
            account: account.clone(),
            accounts: vec![account],
            reader: session.reader,
            signer: session.signer,
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
