//! The connection contract shared by all backends.
//!
//! A [`Connection`] is the established link: network and account info plus
//! the read and signing handles. Handles are opaque capabilities — this core
//! hands them out but never drives transactions through them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::injected::discovery::ProviderDetail;
use crate::backend::injected::InjectedOptions;
use crate::backend::mock::MockOptions;
use crate::backend::rpc::RpcOptions;
use crate::error::WalletError;
use crate::events::{EventKind, EventListener, ListenerId};

// ─── Connection data ─────────────────────────────────────────────────────────

/// The network a connection is established on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
    pub ens_address: Option<String>,
}

/// A connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: String,
    pub ens_address: Option<String>,
}

/// An established connection to a blockchain account.
#[derive(Clone)]
pub struct Connection {
    pub network: Network,
    /// The active account.
    pub account: Account,
    /// Every account the wallet exposed. Single-account backends put the
    /// active account here.
    pub accounts: Vec<Account>,
    /// Read access to the chain (network, balance, name lookups).
    pub reader: Arc<dyn ChainReader>,
    /// Signing capability for the active account.
    pub signer: Arc<dyn Signer>,
    /// The resolved wallet, for connections established through an injected
    /// provider.
    pub wallet: Option<ProviderDetail>,
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.network == other.network
            && self.account == other.account
            && self.accounts == other.accounts
            && self.wallet == other.wallet
            && Arc::ptr_eq(&self.reader, &other.reader)
            && Arc::ptr_eq(&self.signer, &other.signer)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("network", &self.network)
            .field("account", &self.account)
            .field("accounts", &self.accounts)
            .field("wallet", &self.wallet)
            .finish_non_exhaustive()
    }
}

// ─── Capability traits ───────────────────────────────────────────────────────

/// Read access to a chain: network lookup, balance query, best-effort
/// reverse-name (ENS) lookup.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Network info for the chain this reader is attached to.
    async fn network(&self) -> Result<Network, WalletError>;

    /// Native token balance of `address`, in wei.
    async fn balance(&self, address: &str) -> Result<u128, WalletError>;

    /// Reverse-name lookup for `address`. `Ok(None)` means no name is
    /// registered; `Err` means the lookup itself failed.
    async fn lookup_address(&self, address: &str) -> Result<Option<String>, WalletError>;
}

/// Signing capability for a single account. Consumed downstream only.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The account this signer signs for.
    fn address(&self) -> &str;

    /// Sign an arbitrary message, returning the hex-encoded signature.
    async fn sign_message(&self, message: &[u8]) -> Result<String, WalletError>;
}

// ─── Connect options ─────────────────────────────────────────────────────────

/// Backend-specific connect options.
///
/// Each variant is the partial call form of one backend's options; unset
/// fields fall back to the backend's last-used options, then its defaults.
/// Passing a variant to a different backend is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOptions {
    Injected(InjectedOptions),
    Rpc(RpcOptions),
    Mock(MockOptions),
}

impl From<InjectedOptions> for ConnectOptions {
    fn from(options: InjectedOptions) -> Self {
        ConnectOptions::Injected(options)
    }
}

impl From<RpcOptions> for ConnectOptions {
    fn from(options: RpcOptions) -> Self {
        ConnectOptions::Rpc(options)
    }
}

impl From<MockOptions> for ConnectOptions {
    fn from(options: MockOptions) -> Self {
        ConnectOptions::Mock(options)
    }
}

// ─── Backend contract ────────────────────────────────────────────────────────

/// A pluggable connection backend.
///
/// Backends establish and tear down connections and publish the uniform
/// event surface; the wallet service sequences calls so that no two
/// backend-facing operations run concurrently against the same instance.
#[async_trait]
pub trait ConnectionBackend: Send + Sync {
    /// Establish a connection. Returns the cached connection unchanged when
    /// the effective options match the cached ones.
    async fn connect(&self, options: Option<ConnectOptions>) -> Result<Connection, WalletError>;

    /// Tear down the connection. `error` carries the triggering error when
    /// the disconnect is not user-initiated.
    async fn disconnect(&self, error: Option<WalletError>) -> Result<(), WalletError>;

    /// The current connection, if one is established.
    async fn connection(&self) -> Option<Connection>;

    async fn connected(&self) -> bool {
        self.connection().await.is_some()
    }

    /// Listen for uniform connection events from this backend.
    fn listen(&self, kind: EventKind, listener: EventListener) -> ListenerId;

    /// Stop listening.
    fn unlisten(&self, id: ListenerId);
}
