//! Metrics sinks: where devices and samplers write what they observe.
//!
//! The store is append-only. Every write is one [`Record`] handed to
//! [`MetricsSink::write`] as a single unit, so concurrent samplers never
//! interleave partial writes. The `put_*` / `add_meta_info` helpers build the
//! record for the common shapes.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// Scope a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaInfoScope {
    Node,
    Cluster,
}

impl std::fmt::Display for MetaInfoScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Cluster => write!(f, "cluster"),
        }
    }
}

/// Identity attached to a metric, e.g. `{cluster, index, shard}`.
pub type MetaData = BTreeMap<String, String>;

/// A numeric observation. The variant decides which store operation is used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reading {
    /// Cumulative or instantaneous integer count.
    Count(i64),
    /// Measured quantity, possibly fractional.
    Value(f64),
}

impl Reading {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Count(c) => c as f64,
            Self::Value(v) => v,
        }
    }
}

/// One complete append to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Metric {
        scope: MetaInfoScope,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<String>,
        name: String,
        reading: Reading,
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
        meta: MetaData,
    },
    Doc {
        scope: MetaInfoScope,
        doc: Value,
    },
    MetaInfo {
        scope: MetaInfoScope,
        #[serde(skip_serializing_if = "Option::is_none")]
        node: Option<String>,
        key: String,
        value: Value,
    },
}

impl Record {
    /// Name of a metric record, or `None` for docs and meta-info.
    pub fn metric_name(&self) -> Option<&str> {
        match self {
            Self::Metric { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Append-only metrics store shared by all devices and samplers.
pub trait MetricsSink: Send + Sync {
    /// Append one record.
    fn write(&self, record: Record) -> Result<()>;

    fn put_count_node(&self, node: &str, name: &str, count: i64, unit: Option<&str>) -> Result<()> {
        self.put_node(node, name, Reading::Count(count), unit, MetaData::new())
    }

    fn put_value_node(&self, node: &str, name: &str, value: f64, unit: Option<&str>) -> Result<()> {
        self.put_node(node, name, Reading::Value(value), unit, MetaData::new())
    }

    fn put_count_cluster(&self, name: &str, count: i64, unit: Option<&str>) -> Result<()> {
        self.put_cluster(name, Reading::Count(count), unit, MetaData::new())
    }

    fn put_value_cluster(&self, name: &str, value: f64, unit: Option<&str>) -> Result<()> {
        self.put_cluster(name, Reading::Value(value), unit, MetaData::new())
    }

    /// Node-scoped metric with explicit metadata.
    fn put_node(
        &self,
        node: &str,
        name: &str,
        reading: Reading,
        unit: Option<&str>,
        meta: MetaData,
    ) -> Result<()> {
        self.write(Record::Metric {
            scope: MetaInfoScope::Node,
            node: Some(node.to_string()),
            name: name.to_string(),
            reading,
            unit: unit.map(str::to_string),
            meta,
        })
    }

    /// Cluster-scoped metric with explicit metadata.
    fn put_cluster(
        &self,
        name: &str,
        reading: Reading,
        unit: Option<&str>,
        meta: MetaData,
    ) -> Result<()> {
        self.write(Record::Metric {
            scope: MetaInfoScope::Cluster,
            node: None,
            name: name.to_string(),
            reading,
            unit: unit.map(str::to_string),
            meta,
        })
    }

    fn put_doc(&self, scope: MetaInfoScope, doc: Value) -> Result<()> {
        self.write(Record::Doc { scope, doc })
    }

    fn add_meta_info(
        &self,
        scope: MetaInfoScope,
        node: Option<&str>,
        key: &str,
        value: Value,
    ) -> Result<()> {
        self.write(Record::MetaInfo {
            scope,
            node: node.map(str::to_string),
            key: key.to_string(),
            value,
        })
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopSink;

impl MetricsSink for NopSink {
    fn write(&self, _record: Record) -> Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory, in write order.
#[derive(Debug, Default)]
pub struct InMemorySink {
    records: Mutex<Vec<Record>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all records written so far.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of records written so far.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All metric records with the given name.
    pub fn metrics_named(&self, name: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.metric_name() == Some(name))
            .collect()
    }

    /// All meta-info records as `(scope, node, key, value)`.
    pub fn meta_infos(&self) -> Vec<(MetaInfoScope, Option<String>, String, Value)> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::MetaInfo {
                    scope,
                    node,
                    key,
                    value,
                } => Some((scope, node, key, value)),
                _ => None,
            })
            .collect()
    }

    /// All documents written, with their scope.
    pub fn docs(&self) -> Vec<(MetaInfoScope, Value)> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Doc { scope, doc } => Some((scope, doc)),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for InMemorySink {
    fn write(&self, record: Record) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }
}

/// Line written by [`JsonLinesSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub run_id: String,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub record: Record,
}

/// Appends one JSON object per record to a file.
///
/// Every line carries the run id so several benchmark runs can share a file.
pub struct JsonLinesSink {
    path: PathBuf,
    run_id: String,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open (or create) `path` for appending with a fresh run id.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_run_id(path, Uuid::new_v4().to_string())
    }

    pub fn with_run_id(path: impl AsRef<Path>, run_id: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            run_id: run_id.into(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonLinesSink {
    fn write(&self, record: Record) -> Result<()> {
        let line = StoredRecord {
            run_id: self.run_id.clone(),
            timestamp_ms: unix_ms_now(),
            record,
        };
        // Serialize before taking the lock so the critical section is one write.
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
