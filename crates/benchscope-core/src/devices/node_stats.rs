//! Periodic node stats sampling.
//!
//! [`NodeStats`] starts one background [`NodeStatsRecorder`] when it attaches
//! to the cluster and stops it at benchmark stop or when a node detaches. Every tick writes, per node,
//! thread pool, circuit breaker, JVM buffer pool, JVM heap, process CPU and
//! transport metrics, plus the flattened `indices` section when enabled.

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;

use crate::client::StatsClient;
use crate::cluster::{Cluster, Node};
use crate::config::TelemetryParams;
use crate::device::{ClusterObserver, Device, DeviceInfo, LapObserver, NodeObserver};
use crate::error::{Result, TelemetryError};
use crate::fields::{Target, write_flattened};
use crate::sampler::{PeriodicSampler, Recorder, SampleInterval};
use crate::sink::MetricsSink;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "node-stats",
    human_name: "Node Stats",
    help: "Regularly samples node stats",
    internal: false,
};

pub const SAMPLE_INTERVAL_PARAM: &str = "node-stats-sample-interval";
pub const INCLUDE_INDICES_PARAM: &str = "node-stats-include-indices";

const ENDPOINT: &str = "/_nodes/stats";

/// One node stats sample per tick.
pub struct NodeStatsRecorder {
    cluster_name: String,
    client: Arc<dyn StatsClient>,
    sink: Arc<dyn MetricsSink>,
    include_indices: bool,
    interval: SampleInterval,
}

impl NodeStatsRecorder {
    pub fn new(
        params: &TelemetryParams,
        cluster_name: impl Into<String>,
        client: Arc<dyn StatsClient>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let interval =
            SampleInterval::new(SAMPLE_INTERVAL_PARAM, params.float(SAMPLE_INTERVAL_PARAM, 1.0)?)?;
        Ok(Self {
            cluster_name: cluster_name.into(),
            client,
            sink,
            include_indices: params.bool(INCLUDE_INDICES_PARAM, false)?,
            interval,
        })
    }

    pub fn interval(&self) -> SampleInterval {
        self.interval
    }

    fn record_node(&self, node: &str, stats: &Value) -> Result<usize> {
        let sink = self.sink.as_ref();
        let target = Target::Node(node);
        let mut written = 0;

        if self.include_indices {
            if let Some(indices) = stats.get("indices").and_then(Value::as_object) {
                written += write_flattened(sink, target, "indices_", indices, true)?;
            }
        }
        for (section, prefix) in [
            ("thread_pool", "thread_pool_"),
            ("breakers", "breaker_"),
        ] {
            written += self.record_groups(node, stats.get(section), prefix)?;
        }
        if let Some(jvm) = stats.get("jvm") {
            written += self.record_groups(node, jvm.get("buffer_pools"), "jvm_buffer_pool_")?;
            if let Some(mem) = jvm.get("mem").and_then(Value::as_object) {
                written += write_flattened(sink, target, "jvm_mem_", mem, false)?;
            }
        }
        if let Some(cpu) = stats
            .get("process")
            .and_then(|p| p.get("cpu"))
            .and_then(Value::as_object)
        {
            written += write_flattened(sink, target, "process_cpu_", cpu, false)?;
        }
        if let Some(transport) = stats.get("transport").and_then(Value::as_object) {
            written += write_flattened(sink, target, "transport_", transport, false)?;
        }
        Ok(written)
    }

    /// `{group: {field: n}}` → `<prefix><group>_<field>` for every group.
    fn record_groups(&self, node: &str, section: Option<&Value>, prefix: &str) -> Result<usize> {
        let Some(groups) = section.and_then(Value::as_object) else {
            return Ok(0);
        };
        let mut written = 0;
        for (group, fields) in groups {
            if let Some(fields) = fields.as_object() {
                written += write_flattened(
                    self.sink.as_ref(),
                    Target::Node(node),
                    &format!("{prefix}{group}_"),
                    fields,
                    false,
                )?;
            }
        }
        Ok(written)
    }
}

impl Recorder for NodeStatsRecorder {
    fn name(&self) -> String {
        format!("node-stats-{}", self.cluster_name)
    }

    fn record(&mut self) -> Result<()> {
        let stats = self.client.nodes_stats("").map_err(|e| {
            TelemetryError::transport("node stats", ENDPOINT, &self.cluster_name, e)
        })?;
        let Some(nodes) = stats.get("nodes").and_then(Value::as_object) else {
            warn!("node stats response of cluster [{}] has no nodes", self.cluster_name);
            return Ok(());
        };
        for node_stats in nodes.values() {
            let Some(node) = node_stats.get("name").and_then(Value::as_str) else {
                continue;
            };
            let written = self.record_node(node, node_stats)?;
            debug!("recorded {written} node stats for [{node}]");
        }
        Ok(())
    }
}

/// Samples node stats of the benchmarked cluster while the benchmark runs.
pub struct NodeStats {
    recorder: Option<NodeStatsRecorder>,
    sampler: Option<PeriodicSampler>,
}

impl NodeStats {
    /// Validates the parameters right away; the sampler starts on cluster attach.
    pub fn new(
        params: &TelemetryParams,
        cluster_name: impl Into<String>,
        client: Arc<dyn StatsClient>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        Ok(Self {
            recorder: Some(NodeStatsRecorder::new(params, cluster_name, client, sink)?),
            sampler: None,
        })
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.as_ref().is_some_and(PeriodicSampler::is_running)
    }

    fn stop_sampling(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }
    }
}

impl ClusterObserver for NodeStats {
    fn attach_to_cluster(&mut self, _cluster: &mut Cluster) -> Result<()> {
        if let Some(recorder) = self.recorder.take() {
            let interval = recorder.interval();
            info!("{}: sampling every {}s", INFO.human_name, interval.as_secs_f64());
            self.sampler = Some(PeriodicSampler::start(recorder, interval)?);
        }
        Ok(())
    }
}

impl LapObserver for NodeStats {
    fn on_benchmark_start(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_benchmark_stop(&mut self) -> Result<()> {
        self.stop_sampling();
        Ok(())
    }
}

impl NodeObserver for NodeStats {
    fn detach_from_node(&mut self, node: &Node, _running: bool) -> Result<()> {
        if self.sampler.is_some() {
            debug!("{}: stopping on detach from [{}]", INFO.human_name, node.node_name);
        }
        self.stop_sampling();
        Ok(())
    }
}

impl Device for NodeStats {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_cluster_observer(&mut self) -> Option<&mut dyn ClusterObserver> {
        Some(self)
    }

    fn as_node_observer(&mut self) -> Option<&mut dyn NodeObserver> {
        Some(self)
    }

    fn as_lap_observer(&mut self) -> Option<&mut dyn LapObserver> {
        Some(self)
    }
}
