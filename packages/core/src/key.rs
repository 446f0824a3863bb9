use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

/// Stable identity of a node within one editor instance.
///
/// Keys are handed out by the editor's [`KeyGenerator`] and are never reused
/// while the editor lives, so they double as the reconciler's diff key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The root node always owns key zero.
    pub const ROOT: NodeKey = NodeKey(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Sequential key generator for nodes of one editor
#[derive(Debug)]
pub struct KeyGenerator {
    count: Cell<u64>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self { count: Cell::new(0) }
    }

    /// Generate next sequential key
    pub fn next_key(&self) -> NodeKey {
        let next = self.count.get() + 1;
        self.count.set(next);
        NodeKey(next)
    }

    /// Number of keys handed out so far
    pub fn issued(&self) -> u64 {
        self.count.get()
    }

    /// Make sure `key` is never handed out again
    pub fn reserve(&self, key: NodeKey) {
        if key.0 > self.count.get() {
            self.count.set(key.0);
        }
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}
