//! # evmlink
//!
//! A Rust SDK for EVM wallet connections: one wallet state machine over
//! interchangeable connection backends.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Core** — Errors, known networks, the uniform event surface, the
//!    connection contract (backend trait + opaque read/sign capabilities)
//! 2. **Backends** — Injected wallet (discovery, identity matching, chain
//!    switching, quirk absorption), RPC+private-key, mock
//! 3. **Wallet service** — The connection state machine with single-flight
//!    connect/disconnect and state-snapshot subscriptions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use evmlink::prelude::*;
//!
//! let backend = InjectedBackend::builder()
//!     .bus(bus)
//!     .readers(readers)
//!     .build()?;
//!
//! let wallet = WalletService::new(Arc::new(backend));
//! let connection = wallet.connect(None).await?;
//! println!("connected to {} as {}", connection.network.name, connection.account.address);
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Unified SDK error type.
pub mod error;

/// Known networks and chain-id display helpers.
pub mod network;

/// The uniform connection-event surface and its listener registry.
pub mod events;

/// The connection contract shared by all backends.
pub mod connection;

// ── Layer 2: Backends ────────────────────────────────────────────────────────

/// Connection backends: injected wallet, RPC+private-key, mock.
pub mod backend;

// ── Layer 3: Wallet service ──────────────────────────────────────────────────

/// The wallet service — the connection state machine.
pub mod wallet;

/// Wallet preferences over a persistent key-value store.
pub mod prefs;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Errors
    pub use crate::error::WalletError;

    // Connection contract
    pub use crate::connection::{
        Account, ChainReader, ConnectOptions, Connection, ConnectionBackend, Network, Signer,
    };

    // Events
    pub use crate::events::{ConnectionEvent, EventKind, EventListener, ListenerId, Listeners};

    // Backends
    pub use crate::backend::injected::discovery::{
        AnnounceSink, DiscoveryBus, ProviderDetail, ProviderInfo,
    };
    pub use crate::backend::injected::identity::{
        select_provider, provider_index, WalletIdentity,
    };
    pub use crate::backend::injected::transport::{
        InjectedProvider, ProviderEvent, ProviderRpcError,
    };
    pub use crate::backend::injected::{
        InjectedBackend, InjectedBackendBuilder, InjectedConfig, InjectedOptions, ReaderFactory,
    };
    pub use crate::backend::mock::{MockBackend, MockConfig, MockOptions};
    pub use crate::backend::rpc::{
        RpcBackend, RpcConfig, RpcConnector, RpcOptions, RpcSession,
    };

    // Wallet service
    pub use crate::wallet::state::{ObserverId, StateObserver, WalletState, WalletStatus};
    pub use crate::wallet::WalletService;

    // Preferences
    pub use crate::prefs::{
        MemoryPreferenceStore, PreferenceStore, WalletPreferences, AUTO_CONNECT_KEY,
        WALLET_IDENTITY_KEY,
    };

    // Networks
    pub use crate::network::{network_name, DEFAULT_CHAIN_ID};
}
