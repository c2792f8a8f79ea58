use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

// The bootstrap node listens on this port, so it is also the default id.
static DEFAULT_NODE_ID: &str = "3000";

const NODE_ID_KEY: &str = "NODE_ID";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";

/// Process-wide node settings, seeded from the `NODE_ID` environment
/// variable. The id selects the listen port, the chain DB file and the
/// wallets file, so several nodes can share one machine.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let node_id = env::var(NODE_ID_KEY).unwrap_or_else(|_| String::from(DEFAULT_NODE_ID));

        let mut map = HashMap::new();
        map.insert(String::from(NODE_ID_KEY), node_id);

        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn get_node_id(&self) -> String {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner
            .get(NODE_ID_KEY)
            .expect("Node id should always be present in config")
            .clone()
    }

    /// The address this node binds and announces to peers
    pub fn get_node_addr(&self) -> String {
        format!("localhost:{}", self.get_node_id())
    }

    pub fn set_mining_addr(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on config - this should never happen");
        let _ = inner.insert(String::from(MINING_ADDRESS_KEY), addr);
    }

    pub fn get_mining_addr(&self) -> Option<String> {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner.get(MINING_ADDRESS_KEY).cloned()
    }

    pub fn is_miner(&self) -> bool {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on config - this should never happen");
        inner.contains_key(MINING_ADDRESS_KEY)
    }
}
