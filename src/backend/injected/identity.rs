//! Wallet identity comparison and candidate selection.
//!
//! A wallet's `uuid` is minted fresh every session, so it never works as a
//! cross-session key — `(name, rdns)` is the stable part. Reconciling a
//! remembered wallet with the currently discovered set therefore tries an
//! exact match (all three fields) first and falls back to a fuzzy match on
//! `(name, rdns)` only. A fuzzy match is only trusted when it is unique:
//! two wallets sharing `(name, rdns)` may mean one of them is imitating the
//! other, and we never auto-select among them.

use serde::{Deserialize, Serialize};

use super::discovery::ProviderDetail;

/// Identity of a discovered wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub name: String,
    pub rdns: String,
    /// Volatile per-session id.
    pub uuid: String,
}

impl WalletIdentity {
    /// Compare the stable `(name, rdns)` pair only.
    pub fn fuzzy_eq(&self, other: &WalletIdentity) -> bool {
        self.name == other.name && self.rdns == other.rdns
    }

    /// Compare all three fields, including the volatile uuid.
    pub fn exact_eq(&self, other: &WalletIdentity) -> bool {
        self.fuzzy_eq(other) && self.uuid == other.uuid
    }
}

/// Compare two optional identities. Two absent identities match.
pub fn identities_match(
    identity: Option<&WalletIdentity>,
    other: Option<&WalletIdentity>,
    exact: bool,
) -> bool {
    match (identity, other) {
        (Some(identity), Some(other)) => {
            if exact {
                identity.exact_eq(other)
            } else {
                identity.fuzzy_eq(other)
            }
        }
        (None, None) => true,
        _ => false,
    }
}

/// The first provider whose identity matches `identity` exactly.
pub fn exact_match<'a>(
    providers: &'a [ProviderDetail],
    identity: &WalletIdentity,
) -> Option<&'a ProviderDetail> {
    providers
        .iter()
        .find(|provider| provider.identity().exact_eq(identity))
}

/// All providers whose identities fuzzy-match `identity`, in discovery order.
pub fn fuzzy_matches<'a>(
    providers: &'a [ProviderDetail],
    identity: &WalletIdentity,
) -> Vec<&'a ProviderDetail> {
    providers
        .iter()
        .filter(|provider| provider.identity().fuzzy_eq(identity))
        .collect()
}

/// Resolve the provider matching a remembered identity.
///
/// Exact match wins; otherwise a fuzzy match is used only when it is unique.
/// Zero or ambiguous fuzzy matches resolve to `None` — the caller has to ask
/// the user to pick a wallet explicitly.
pub fn select_provider<'a>(
    providers: &'a [ProviderDetail],
    identity: Option<&WalletIdentity>,
) -> Option<&'a ProviderDetail> {
    let identity = identity?;

    if let Some(provider) = exact_match(providers, identity) {
        return Some(provider);
    }

    let fuzzy = fuzzy_matches(providers, identity);
    match fuzzy.as_slice() {
        [provider] => Some(provider),
        _ => None,
    }
}

/// Like [`select_provider`], but returns the index into `providers`.
///
/// When duplicate identities exist the first occurrence wins, which keeps
/// the index stable for selection UIs.
pub fn provider_index(
    providers: &[ProviderDetail],
    identity: Option<&WalletIdentity>,
) -> Option<usize> {
    let selected = select_provider(providers, identity)?;
    providers
        .iter()
        .position(|provider| std::ptr::eq(provider, selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::injected::discovery::ProviderInfo;
    use crate::backend::injected::transport::{InjectedProvider, ProviderEvent, ProviderRpcError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    struct NullProvider {
        events: broadcast::Sender<ProviderEvent>,
    }

    #[async_trait]
    impl InjectedProvider for NullProvider {
        async fn request(&self, _method: &str, _params: Value) -> Result<Value, ProviderRpcError> {
            Err(ProviderRpcError::new(-32601, "unsupported"))
        }

        fn events(&self) -> broadcast::Receiver<ProviderEvent> {
            self.events.subscribe()
        }
    }

    fn detail(name: &str, rdns: &str, uuid: &str) -> ProviderDetail {
        let (events, _) = broadcast::channel(4);
        ProviderDetail::new(
            ProviderInfo {
                uuid: uuid.into(),
                name: name.into(),
                rdns: rdns.into(),
                icon: "data:,".into(),
            },
            Arc::new(NullProvider { events }),
        )
    }

    fn identity(name: &str, rdns: &str, uuid: &str) -> WalletIdentity {
        WalletIdentity {
            name: name.into(),
            rdns: rdns.into(),
            uuid: uuid.into(),
        }
    }

    #[test]
    fn test_exact_match_requires_uuid() {
        let providers = vec![detail("x", "y", "u1"), detail("x", "y", "u2")];
        let stored = identity("x", "y", "u1");

        let matched = exact_match(&providers, &stored).unwrap();
        assert_eq!(matched.info.uuid, "u1");
    }

    #[test]
    fn test_ambiguous_fuzzy_match_resolves_to_none() {
        // two wallets with the same (name, rdns) — possibly a spoof attempt
        let providers = vec![detail("x", "y", "u1"), detail("x", "y", "u2")];
        let stored = identity("x", "y", "stale-uuid");

        assert!(select_provider(&providers, Some(&stored)).is_none());
    }

    #[test]
    fn test_unique_fuzzy_match_resolves() {
        let providers = vec![detail("x", "y", "u1")];
        let stored = identity("x", "y", "stale-uuid");

        let matched = select_provider(&providers, Some(&stored)).unwrap();
        assert_eq!(matched.info.uuid, "u1");
    }

    #[test]
    fn test_exact_match_preferred_over_fuzzy() {
        let providers = vec![detail("x", "y", "u1"), detail("x", "y", "u2")];
        let stored = identity("x", "y", "u2");

        let matched = select_provider(&providers, Some(&stored)).unwrap();
        assert_eq!(matched.info.uuid, "u2");
    }

    #[test]
    fn test_no_identity_resolves_to_none() {
        let providers = vec![detail("x", "y", "u1")];
        assert!(select_provider(&providers, None).is_none());
    }

    #[test]
    fn test_provider_index_first_occurrence_wins() {
        let providers = vec![
            detail("a", "com.a", "u1"),
            detail("x", "y", "u2"),
            detail("x", "y", "u2"),
        ];
        let stored = identity("x", "y", "u2");

        assert_eq!(provider_index(&providers, Some(&stored)), Some(1));
    }

    #[test]
    fn test_identities_match_option_semantics() {
        let a = identity("x", "y", "u1");
        let b = identity("x", "y", "u2");

        assert!(identities_match(Some(&a), Some(&b), false));
        assert!(!identities_match(Some(&a), Some(&b), true));
        assert!(identities_match(None, None, true));
        assert!(!identities_match(Some(&a), None, false));
    }
}
