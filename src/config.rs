use once_cell::sync::Lazy;
use std::env;
use std::sync::RwLock;

use crate::server::CENTRAL_NODE;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

/// Node-local configuration: this node's own listen address and, if it
/// chooses to mine, the address that receives block rewards. Populated from
/// the `NODE_ID` environment variable, matching the original tutorial's
/// convention of running several nodes on one host distinguished by port.
pub struct Config {
    node_addr: String,
    mining_addr: RwLock<Option<String>>,
}

impl Config {
    fn new() -> Self {
        let node_addr = env::var("NODE_ID")
            .map(|node_id| format!("localhost:{node_id}"))
            .unwrap_or_else(|_| CENTRAL_NODE.to_string());
        Self { node_addr, mining_addr: RwLock::new(None) }
    }

    pub fn get_node_addr(&self) -> String {
        self.node_addr.clone()
    }

    pub fn set_mining_addr(&self, addr: String) {
        let mut mining_addr = self.mining_addr.write().expect("mining address lock poisoned");
        *mining_addr = Some(addr);
    }

    pub fn get_mining_addr(&self) -> Option<String> {
        self.mining_addr.read().expect("mining address lock poisoned").clone()
    }

    pub fn is_miner(&self) -> bool {
        self.get_mining_addr().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mining_addr_starts_unset() {
        let config = Config::new();
        assert!(!config.is_miner());
        config.set_mining_addr(String::from("miner-address"));
        assert!(config.is_miner());
        assert_eq!(config.get_mining_addr().as_deref(), Some("miner-address"));
    }
}
