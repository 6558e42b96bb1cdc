use std::sync::RwLock;

/// A peer's address, as advertised in `version`/`addr` messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    addr: String,
}

impl Node {
    #[must_use]
    pub fn new(addr: String) -> Self {
        Self { addr }
    }

    pub fn get_addr(&self) -> String {
        self.addr.clone()
    }
}

/// The set of peers this node currently knows about.
#[derive(Default)]
pub struct Nodes {
    inner: RwLock<Vec<Node>>,
}

impl Nodes {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(vec![]) }
    }

    /// Adds `addr` if it isn't already known.
    pub fn add_node(&self, addr: String) {
        let mut inner = self.inner.write().expect("nodes lock poisoned");
        if !inner.iter().any(|node| node.addr == addr) {
            inner.push(Node::new(addr));
        }
    }

    pub fn evict_node(&self, addr: &str) {
        let mut inner = self.inner.write().expect("nodes lock poisoned");
        inner.retain(|node| node.addr != addr);
    }

    pub fn get_nodes(&self) -> Vec<Node> {
        self.inner.read().expect("nodes lock poisoned").clone()
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        self.inner.read().expect("nodes lock poisoned").iter().any(|node| node.addr == addr)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("nodes lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_node_deduplicates() {
        let nodes = Nodes::new();
        nodes.add_node(String::from("127.0.0.1:3000"));
        nodes.add_node(String::from("127.0.0.1:3000"));
        assert_eq!(nodes.len(), 1);
        assert!(nodes.node_is_known("127.0.0.1:3000"));
    }

    #[test]
    fn evict_node_removes_it() {
        let nodes = Nodes::new();
        nodes.add_node(String::from("127.0.0.1:3000"));
        nodes.evict_node("127.0.0.1:3000");
        assert!(nodes.is_empty());
    }
}
