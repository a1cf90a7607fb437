//! The injected-provider transport — request surface, raw events, and the
//! small set of wallet RPC helpers the backend needs.
//!
//! [`InjectedProvider`] is the EIP-1193-style seam: a JSON request method
//! plus a raw event stream. Wallet integrations implement it; the backend
//! only ever talks through it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::WalletError;

/// An error returned by an injected provider's request surface.
#[derive(Error, Debug, Clone)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<ProviderRpcError> for WalletError {
    fn from(error: ProviderRpcError) -> Self {
        WalletError::Provider {
            code: error.code,
            message: error.message,
        }
    }
}

/// A raw event emitted by an injected provider.
///
/// Chain ids arrive as hex strings and are parsed at the bridging layer.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Connect { chain_id: String },
    Disconnect { code: i64, message: String },
    ChainChanged { chain_id: String },
    AccountsChanged { accounts: Vec<String> },
}

/// The request/notify surface exposed by an injected wallet provider.
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    /// Submit an RPC request to the wallet.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Subscribe to the provider's raw event stream.
    fn events(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Parse a chain id in hex (`"0x1"`) or decimal form.
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

// ─── Request helpers ─────────────────────────────────────────────────────────

/// Query the chain the wallet is currently on.
pub async fn chain_id(provider: &dyn InjectedProvider) -> Result<u64, ProviderRpcError> {
    let value = provider.request("eth_chainId", Value::Null).await?;
    value
        .as_str()
        .and_then(parse_chain_id)
        .ok_or_else(|| ProviderRpcError::new(-32603, format!("malformed chain id: {}", value)))
}

/// Request account access from the wallet.
pub async fn request_accounts(
    provider: &dyn InjectedProvider,
) -> Result<Vec<String>, ProviderRpcError> {
    let value = provider.request("eth_requestAccounts", Value::Null).await?;
    serde_json::from_value(value)
        .map_err(|error| ProviderRpcError::new(-32603, format!("malformed account list: {}", error)))
}

/// Ask the wallet to switch to `target_chain_id` and wait for it to happen.
///
/// The switch request resolving does not mean the chain actually changed —
/// the matching `chainChanged` event is the only completion signal, so we
/// subscribe before issuing the request and settle on the first
/// `chainChanged` we see: the target chain means success, any other chain
/// means the switch went elsewhere. The wait is unbounded unless `timeout`
/// is given, since it usually depends on the user confirming in the wallet
/// UI.
pub async fn switch_chain(
    provider: &dyn InjectedProvider,
    target_chain_id: u64,
    timeout: Option<Duration>,
) -> Result<(), WalletError> {
    let mut events = provider.events();

    provider
        .request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": format!("{:#x}", target_chain_id) }]),
        )
        .await?;

    // TODO: on error code 4902 the chain is unknown to the wallet and could
    // be added with wallet_addEthereumChain

    let changed = async {
        loop {
            match events.recv().await {
                Ok(ProviderEvent::ChainChanged { chain_id }) => {
                    return if parse_chain_id(&chain_id) == Some(target_chain_id) {
                        Ok(())
                    } else {
                        Err(WalletError::Other(format!(
                            "wallet switched to another chain ({})",
                            chain_id
                        )))
                    };
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "provider event stream lagged during chain switch");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(WalletError::Other(
                        "provider event stream closed during chain switch".into(),
                    ));
                }
            }
        }
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, changed)
            .await
            .map_err(|_| WalletError::Other("timed out waiting for the chain switch".into()))?,
        None => changed.await,
    }
}

/// Parameters for a `wallet_watchAsset` request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WatchAssetParams {
    /// The asset's interface, e.g. `"ERC20"`, `"ERC721"` or `"ERC1155"`.
    #[serde(rename = "type")]
    pub asset_type: String,
    pub options: WatchAssetOptions,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchAssetOptions {
    /// The token contract address.
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Required for ERC-721 and ERC-1155 tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

/// Ask the wallet to track an asset (EIP-747).
pub async fn watch_asset(
    provider: &dyn InjectedProvider,
    asset: &WatchAssetParams,
) -> Result<(), ProviderRpcError> {
    let params = serde_json::to_value(asset)
        .map_err(|error| ProviderRpcError::new(-32602, error.to_string()))?;
    provider.request("wallet_watchAsset", params).await?;
    Ok(())
}
