//! Tree events fired when a batch is committed
//!
//! Three low-level event types, one per lifecycle transition. Each carries
//! the namespace of the adapter layer that produced it.

use crate::tree::NodeKey;

/// A tree event fired after an adapter finished processing a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    /// Contexts were recognized for the first time
    ContextsAdded {
        keys: Vec<NodeKey>,
        namespace: String,
    },
    /// Parsed context or insertion points changed in place
    ContextsUpdated {
        keys: Vec<NodeKey>,
        namespace: String,
    },
    /// Contexts were destroyed (cascades included)
    ContextsRemoved {
        keys: Vec<NodeKey>,
        namespace: String,
    },
}

impl TreeEvent {
    pub fn keys(&self) -> &[NodeKey] {
        match self {
            Self::ContextsAdded { keys, .. }
            | Self::ContextsUpdated { keys, .. }
            | Self::ContextsRemoved { keys, .. } => keys,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::ContextsAdded { namespace, .. }
            | Self::ContextsUpdated { namespace, .. }
            | Self::ContextsRemoved { namespace, .. } => namespace,
        }
    }
}

/// Accumulates node keys touched while one batch is processed.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    added: Vec<NodeKey>,
    updated: Vec<NodeKey>,
    removed: Vec<NodeKey>,
}

impl ChangeSet {
    pub(crate) fn added(&mut self, key: NodeKey) {
        self.added.push(key);
    }

    pub(crate) fn updated(&mut self, key: NodeKey) {
        if !self.updated.contains(&key) {
            self.updated.push(key);
        }
    }

    pub(crate) fn removed(&mut self, key: NodeKey) {
        self.removed.push(key);
    }

    /// Fold into events. Keys created or destroyed in the same batch are
    /// not also reported as updated.
    pub(crate) fn into_events(self, namespace: &str) -> Vec<TreeEvent> {
        let Self {
            added,
            mut updated,
            removed,
        } = self;
        updated.retain(|k| !added.contains(k) && !removed.contains(k));

        let mut events = Vec::new();
        if !added.is_empty() {
            events.push(TreeEvent::ContextsAdded {
                keys: added,
                namespace: namespace.to_string(),
            });
        }
        if !updated.is_empty() {
            events.push(TreeEvent::ContextsUpdated {
                keys: updated,
                namespace: namespace.to_string(),
            });
        }
        if !removed.is_empty() {
            events.push(TreeEvent::ContextsRemoved {
                keys: removed,
                namespace: namespace.to_string(),
            });
        }
        events
    }
}
