use std::sync::RwLock;

/// A known peer's network address
#[derive(Clone)]
pub struct Node {
    addr: String,
}

impl Node {
    fn new(addr: String) -> Node {
        Node { addr }
    }

    pub fn get_addr(&self) -> String {
        self.addr.clone()
    }
}

/// The known-peer list. The first entry is the bootstrap (central) node;
/// additions are deduplicated and failed peers are evicted.
pub struct Nodes {
    inner: RwLock<Vec<Node>>,
}

impl Nodes {
    /// Start from the bootstrap peer
    pub fn new(central_node: &str) -> Nodes {
        Nodes {
            inner: RwLock::new(vec![Node::new(central_node.to_string())]),
        }
    }

    pub fn add_node(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on nodes - this should never happen");
        if !inner.iter().any(|x| x.get_addr().eq(addr.as_str())) {
            inner.push(Node::new(addr));
        }
    }

    pub fn evict_node(&self, addr: &str) {
        let mut inner = self
            .inner
            .write()
            .expect("Failed to acquire write lock on nodes - this should never happen");
        if let Some(idx) = inner.iter().position(|x| x.get_addr().eq(addr)) {
            inner.remove(idx);
        }
    }

    pub fn get_nodes(&self) -> Vec<Node> {
        self.inner
            .read()
            .expect("Failed to acquire read lock on nodes - this should never happen")
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("Failed to acquire read lock on nodes - this should never happen")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        let inner = self
            .inner
            .read()
            .expect("Failed to acquire read lock on nodes - this should never happen");
        inner.iter().any(|x| x.get_addr().eq(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_node_is_first() {
        let nodes = Nodes::new("localhost:3000");
        assert_eq!(nodes.len(), 1);
        assert!(nodes.node_is_known("localhost:3000"));
    }

    #[test]
    fn test_add_is_idempotent() {
        let nodes = Nodes::new("localhost:3000");
        nodes.add_node("localhost:3001".to_string());
        nodes.add_node("localhost:3001".to_string());
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_evict() {
        let nodes = Nodes::new("localhost:3000");
        nodes.add_node("localhost:3001".to_string());
        nodes.evict_node("localhost:3001");
        assert!(!nodes.node_is_known("localhost:3001"));
        assert_eq!(nodes.len(), 1);
    }
}
