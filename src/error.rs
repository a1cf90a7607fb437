//! Unified SDK error type.

use thiserror::Error;

use crate::network;

/// Top-level wallet error.
///
/// `Clone` so a single connect/disconnect outcome can be fanned out to every
/// coalesced waiter; the display strings are intended for direct display to
/// the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    /// No injected wallets were discovered.
    #[error("No injected wallets detected. Please make sure you have a wallet installed and try again.")]
    WalletUnavailable,

    /// Multiple wallets were discovered and none could be resolved from the
    /// stored identity — the user has to pick one explicitly.
    #[error("No wallet selected. Please select a wallet before connecting.")]
    WalletUnspecified,

    /// The wallet is on a different chain and switching failed or was rejected.
    #[error("Wrong network. Please switch your wallet to the correct network ({}) and try again.", network::format_network(*.chain_id))]
    NetworkMismatch { chain_id: u64 },

    /// A raw provider error, propagated as-is.
    #[error("Provider error {code}: {message}")]
    Provider { code: i64, message: String },

    /// A reverse-name lookup failed. Backends log and swallow this — it never
    /// surfaces to callers.
    #[error("ENS lookup failed for {address}: {reason}")]
    EnsLookup { address: String, reason: String },

    #[error("{0}")]
    Other(String),
}
