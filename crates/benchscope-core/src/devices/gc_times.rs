//! Young and old generation GC time spent during a lap.

use std::sync::Arc;

use serde_json::Value;

use crate::client::StatsClient;
use crate::delta::{LapDelta, Snapshot};
use crate::device::{Device, DeviceInfo, LapObserver};
use crate::error::{Result, TelemetryError};
use crate::sink::MetricsSink;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "gc-times",
    human_name: "GC Times Summary",
    help: "Gathers garbage collection time statistics",
    internal: true,
};

const GENERATIONS: [&str; 2] = ["young", "old"];

pub struct GcTimesSummary {
    cluster_name: String,
    client: Arc<dyn StatsClient>,
    sink: Arc<dyn MetricsSink>,
    delta: LapDelta,
}

impl GcTimesSummary {
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

    /// Collection time per `<node>/<generation>`.
    fn gc_times(&self) -> Result<Snapshot> {
        let stats = self
            .client
            .nodes_stats("jvm")
            .map_err(|e| {
                TelemetryError::transport("GC times", "/_nodes/stats/jvm", &self.cluster_name, e)
            })?;
        Ok(collection_times(&stats))
    }
}

fn collection_times(stats: &Value) -> Snapshot {
    let mut times = Snapshot::new();
    let Some(nodes) = stats["nodes"].as_object() else {
        return times;
    };
    for node in nodes.values() {
        let Some(name) = node["name"].as_str() else {
            continue;
        };
        let collectors = &node["jvm"]["gc"]["collectors"];
        for generation in GENERATIONS {
            if let Some(ms) = collectors[generation]["collection_time_in_millis"].as_f64() {
                times.insert(format!("{name}/{generation}"), ms);
            }
        }
    }
    times
}

impl LapObserver for GcTimesSummary {
    fn on_benchmark_start(&mut self) -> Result<()> {
        let snapshot = self.gc_times()?;
        self.delta.begin(snapshot);
        Ok(())
    }

    fn on_benchmark_stop(&mut self) -> Result<()> {
        if !self.delta.has_snapshot() {
            return Ok(());
        }
        let current = self.gc_times()?;
        let mut totals = [0.0_f64; 2];
        for (key, took) in self.delta.finish(&current) {
            let Some((node, generation)) = key.rsplit_once('/') else {
                continue;
            };
            let idx = if generation == "young" { 0 } else { 1 };
            totals[idx] += took;
            self.sink.put_value_node(
                node,
                &format!("node_{generation}_gen_gc_time"),
                took,
                Some("ms"),
            )?;
        }
        self.sink
            .put_value_cluster("node_total_young_gen_gc_time", totals[0], Some("ms"))?;
        self.sink
            .put_value_cluster("node_total_old_gen_gc_time", totals[1], Some("ms"))?;
        Ok(())
    }
}

impl Device for GcTimesSummary {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_lap_observer(&mut self) -> Option<&mut dyn LapObserver> {
        Some(self)
    }
}
