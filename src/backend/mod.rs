//! Connection backends.
//!
//! Every backend implements the [`crate::connection::ConnectionBackend`]
//! contract — the wallet service is backend-agnostic and the variants are
//! interchangeable behind it.

pub mod injected;
pub mod mock;
pub mod rpc;

pub use injected::{InjectedBackend, InjectedBackendBuilder, InjectedConfig, InjectedOptions};
pub use mock::{MockBackend, MockConfig, MockOptions};
pub use rpc::{RpcBackend, RpcConfig, RpcConnector, RpcOptions, RpcSession};
