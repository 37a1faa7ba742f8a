// src/view.rs

//! Read-only view of the proposed configuration handed to every pipeline.

use std::sync::Arc;

use serde_json::Value;

use crate::errors::Result;

/// Shared, immutable configuration tree.
///
/// Cloning is cheap; subsystems that need to modify a sub-tree take a
/// private copy with [`ConfigView::to_owned_value`].
#[derive(Debug, Clone)]
pub struct ConfigView {
    root: Arc<Value>,
}

impl ConfigView {
    pub fn new(root: Value) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// An empty object tree.
    pub fn empty() -> Self {
        Self::new(Value::Object(Default::default()))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(s)?))
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Node at `path`, walking object keys.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(self.root.as_ref(), |node, key| node.as_object()?.get(*key))
    }

    pub fn exists(&self, path: &[&str]) -> bool {
        self.get(path).is_some()
    }

    /// Deep copy of the node at `path` (or the whole tree for `&[]`).
    pub fn to_owned_value(&self, path: &[&str]) -> Option<Value> {
        self.get(path).cloned()
    }
}

impl Default for ConfigView {
    fn default() -> Self {
        Self::empty()
    }
}
