//! Abstract key-value tree exchange.
//!
//! The storage core never touches raw files; everything it persists
//! goes through named ordered trees supplied by the underlying
//! transactional tree engine. Only the operations the core needs are
//! modeled here.

use std::collections::{BTreeMap, HashMap};

pub trait TreeExchange {
    fn get(&self, tree: &str, key: &[u8]) -> Option<Vec<u8>>;

    fn put(&mut self, tree: &str, key: &[u8], value: &[u8]);

    /// Smallest entry with key strictly greater than `key`;
    /// `None` starts from the beginning of the tree.
    fn next(&self, tree: &str, key: Option<&[u8]>) -> Option<(Vec<u8>, Vec<u8>)>;

    fn remove_all(&mut self, tree: &str);
}

/// In-process tree exchange backed by ordered maps. Used by tests and
/// embedded deployments.
#[derive(Debug, Default)]
pub struct MemTree {
    trees: HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemTree {
    #[inline]
    pub fn new() -> Self {
        MemTree::default()
    }
}

impl TreeExchange for MemTree {
    fn get(&self, tree: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.trees.get(tree)?.get(key).cloned()
    }

    fn put(&mut self, tree: &str, key: &[u8], value: &[u8]) {
        self.trees
            .entry(tree.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
    }

    fn next(&self, tree: &str, key: Option<&[u8]>) -> Option<(Vec<u8>, Vec<u8>)> {
        use std::ops::Bound;
        let tree = self.trees.get(tree)?;
        let entry = match key {
            None => tree.iter().next(),
            Some(k) => tree
                .range((Bound::Excluded(k.to_vec()), Bound::Unbounded))
                .next(),
        };
        entry.map(|(k, v)| (k.clone(), v.clone()))
    }

    fn remove_all(&mut self, tree: &str) {
        self.trees.remove(tree);
    }
}
