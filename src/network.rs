//! Known networks and chain-id display helpers.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Chain id used when connect options don't specify one (Ethereum mainnet).
pub const DEFAULT_CHAIN_ID: u64 = 1;

lazy_static! {
    static ref NETWORKS: HashMap<u64, &'static str> = {
        let mut networks = HashMap::new();
        networks.insert(1, "mainnet");
        networks.insert(5, "goerli");
        networks.insert(42161, "arbitrum");
        networks.insert(421613, "arbitrum goerli");
        networks.insert(421614, "arbitrum sepolia");
        networks.insert(11155111, "sepolia");
        networks
    };
}

/// The well-known name of a chain id, if we have one.
pub fn network_name(chain_id: u64) -> Option<&'static str> {
    NETWORKS.get(&chain_id).copied()
}

/// Format a chain id for user-facing messages, e.g. `"name: mainnet, chain: 1"`.
pub(crate) fn format_network(chain_id: u64) -> String {
    match network_name(chain_id) {
        Some(name) => format!("name: {}, chain: {}", name, chain_id),
        None => format!("chain: {}", chain_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_name_known() {
        assert_eq!(network_name(1), Some("mainnet"));
        assert_eq!(network_name(42161), Some("arbitrum"));
    }

    #[test]
    fn test_network_name_unknown() {
        assert_eq!(network_name(1337), None);
    }

    #[test]
    fn test_format_network() {
        assert_eq!(format_network(1), "name: mainnet, chain: 1");
        assert_eq!(format_network(1337), "chain: 1337");
    }
}
