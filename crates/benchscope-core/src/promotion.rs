//! Meta-info promotion across the node set of one pass.
//!
//! Values are collected for every node first and written afterwards, so the
//! cluster-scope decision always sees the complete node set.

use serde_json::Value;

use crate::error::Result;
use crate::sink::{MetaInfoScope, MetricsSink};

/// Keys that identify a node; never promoted to cluster scope.
pub const IDENTITY_KEYS: [&str; 2] = ["node_name", "host_name"];

/// One pass of node-level meta-info over a known node set.
#[derive(Debug)]
pub struct MetaInfoPass {
    nodes: Vec<String>,
    /// Per key, in first-seen order: `(node, value)` in add order.
    entries: Vec<(String, Vec<(String, Value)>)>,
}

impl MetaInfoPass {
    /// Start a pass over `nodes`. Promotion requires a value from each of them.
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, node: &str, key: &str, value: Value) {
        let idx = match self.entries.iter().position(|(k, _)| k == key) {
            Some(idx) => idx,
            None => {
                self.entries.push((key.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        self.entries[idx].1.push((node.to_string(), value));
    }

    /// Add `value` only when it is present.
    pub fn add_opt<V: Into<Value>>(&mut self, node: &str, key: &str, value: Option<V>) {
        if let Some(v) = value {
            self.add(node, key, v.into());
        }
    }

    /// The cluster-scope value for `key`, if it qualifies for promotion.
    pub fn promoted(&self, key: &str) -> Option<&Value> {
        if IDENTITY_KEYS.contains(&key) || self.nodes.is_empty() {
            return None;
        }
        let (_, values) = self.entries.iter().find(|(k, _)| k == key)?;
        let first = self
            .nodes
            .first()
            .and_then(|n| value_for(values, n))?;
        self.nodes
            .iter()
            .all(|n| value_for(values, n) == Some(first))
            .then_some(first)
    }

    /// Write all node-scope entries, each key followed by its promotion.
    pub fn flush(self, sink: &dyn MetricsSink) -> Result<()> {
        for (key, values) in &self.entries {
            for (node, value) in values {
                sink.add_meta_info(MetaInfoScope::Node, Some(node), key, value.clone())?;
            }
            if let Some(value) = self.promoted(key) {
                sink.add_meta_info(MetaInfoScope::Cluster, None, key, value.clone())?;
            }
        }
        Ok(())
    }
}

fn value_for<'a>(values: &'a [(String, Value)], node: &str) -> Option<&'a Value> {
    values.iter().find(|(n, _)| n == node).map(|(_, v)| v)
}
