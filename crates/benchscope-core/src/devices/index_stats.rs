//! Cumulative indexing times per lap plus point-in-time segment gauges.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::client::StatsClient;
use crate::delta::{LapDelta, Snapshot};
use crate::device::{Device, DeviceInfo, LapObserver};
use crate::error::{Result, TelemetryError};
use crate::fields::{Field, Target, lookup, write_fields};
use crate::sink::{MetaData, MetaInfoScope, MetricsSink};

pub const INFO: DeviceInfo = DeviceInfo {
    command: "index-stats",
    human_name: "Index Stats",
    help: "Gathers indices stats",
    internal: true,
};

/// Metric name and path of every lap-diffed time, relative to a shard or
/// to `_all.primaries`.
const TIMES: [(&str, &str); 5] = [
    ("merges_total_time", "merges.total_time_in_millis"),
    ("merges_total_throttled_time", "merges.total_throttled_time_in_millis"),
    ("indexing_total_time", "indexing.index_time_in_millis"),
    ("refresh_total_time", "refresh.total_time_in_millis"),
    ("flush_total_time", "flush.total_time_in_millis"),
];

const PRIMARY_GAUGES: [Field; 7] = [
    Field::count("segments.count"),
    Field::value("segments.memory_in_bytes", "byte"),
    Field::value("segments.doc_values_memory_in_bytes", "byte"),
    Field::value("segments.stored_fields_memory_in_bytes", "byte"),
    Field::value("segments.terms_memory_in_bytes", "byte"),
    Field::value("segments.norms_memory_in_bytes", "byte"),
    Field::value("segments.points_memory_in_bytes", "byte"),
];

const TOTAL_GAUGES: [Field; 2] = [
    Field::value("store.size_in_bytes", "byte"),
    Field::value("translog.size_in_bytes", "byte"),
];

pub struct IndexStats {
    cluster_name: String,
    client: Arc<dyn StatsClient>,
    sink: Arc<dyn MetricsSink>,
    delta: LapDelta,
}

impl IndexStats {
    pub fn new(
        cluster_name: impl Into<String>,
        client: Arc<dyn StatsClient>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            client,
            sink,
            delta: LapDelta::new(),
        }
    }

    fn index_stats(&self) -> Result<Value> {
        self.client.indices_stats("_all").map_err(|e| {
            TelemetryError::transport(
                "index stats",
                "/_stats/_all?level=shards",
                &self.cluster_name,
                e,
            )
        })
    }
}

fn primary_times(stats: &Value) -> Snapshot {
    let primaries = &stats["_all"]["primaries"];
    TIMES
        .iter()
        .filter_map(|(name, path)| {
            lookup(primaries, path)
                .and_then(Value::as_f64)
                .map(|v| (name.to_string(), v))
        })
        .collect()
}

/// Sorted values at `path` of every primary shard copy.
fn per_shard(stats: &Value, path: &str) -> Vec<Value> {
    let mut values: Vec<u64> = Vec::new();
    let Some(indices) = stats["indices"].as_object() else {
        return Vec::new();
    };
    for index in indices.values() {
        let Some(shards) = index["shards"].as_object() else {
            continue;
        };
        for copy in shards.values().filter_map(Value::as_array).flatten() {
            if copy["routing"]["primary"].as_bool() != Some(true) {
                continue;
            }
            if let Some(v) = lookup(copy, path).and_then(Value::as_u64) {
                values.push(v);
            }
        }
    }
    values.sort_unstable();
    values.into_iter().map(Value::from).collect()
}

/// Whole numbers are stored as integers.
fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

impl LapObserver for IndexStats {
    fn on_benchmark_start(&mut self) -> Result<()> {
        let stats = self.index_stats()?;
        self.delta.begin(primary_times(&stats));
        Ok(())
    }

    fn on_benchmark_stop(&mut self) -> Result<()> {
        let stats = self.index_stats()?;
        let lap = self.delta.finish(&primary_times(&stats));
        for (name, path) in TIMES {
            let Some(took) = lap.get(name) else {
                continue;
            };
            self.sink.put_doc(
                MetaInfoScope::Cluster,
                json!({
                    "name": name,
                    "value": number(*took),
                    "unit": "ms",
                    "per-shard": per_shard(&stats, path),
                }),
            )?;
        }

        let meta = MetaData::new();
        let sink = self.sink.as_ref();
        write_fields(sink, Target::Cluster, "", &PRIMARY_GAUGES, &stats["_all"]["primaries"], &meta)?;
        write_fields(sink, Target::Cluster, "", &TOTAL_GAUGES, &stats["_all"]["total"], &meta)?;
        Ok(())
    }
}

impl Device for IndexStats {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_lap_observer(&mut self) -> Option<&mut dyn LapObserver> {
        Some(self)
    }
}
