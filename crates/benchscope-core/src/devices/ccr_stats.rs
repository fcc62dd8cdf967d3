//! Periodic cross-cluster replication (CCR) follower stats.
//!
//! One [`CcrStatsRecorder`] per configured cluster. Each tick writes every
//! follower shard's stats at cluster scope, identified by
//! `{cluster, index, shard}` metadata. An optional per-cluster allow-list of
//! follower indices restricts what is written.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use serde_json::Value;

use crate::client::{CCR_STATS_PATH, StatsClient};
use crate::cluster::{Cluster, Node};
use crate::config::TelemetryParams;
use crate::device::{ClusterObserver, Device, DeviceInfo, LapObserver, NodeObserver};
use crate::error::{Result, TelemetryError};
use crate::fields::{Field, Target, write_fields};
use crate::sampler::{PeriodicSampler, Recorder, SampleInterval};
use crate::sink::{MetaData, MetricsSink};

pub const INFO: DeviceInfo = DeviceInfo {
    command: "ccr-stats",
    human_name: "CCR Stats",
    help: "Regularly samples Cross Cluster Replication (CCR) related stats",
    internal: false,
};

pub const SAMPLE_INTERVAL_PARAM: &str = "ccr-stats-sample-interval";
pub const INDICES_PARAM: &str = "ccr-stats-indices";

/// Per-shard follower fields, all written as counts.
pub const CCR_FIELDS: [Field; 9] = [
    Field::count_in("total_fetch_time_millis", "ms"),
    Field::count_in("total_index_time_millis", "ms"),
    Field::count("operations_received_field"),
    Field::count("number_of_batches_field"),
    Field::count_in("total_transferred_bytes", "byte"),
    Field::count_in("current_idle_time_millis", "ms"),
    Field::count("leader_max_seq_no"),
    Field::count("follower_primary_max_seq_no"),
    Field::count("processed_global_checkpoint"),
];

pub struct CcrStatsRecorder {
    cluster_name: String,
    client: Arc<dyn StatsClient>,
    sink: Arc<dyn MetricsSink>,
    interval: SampleInterval,
    indices: Option<Vec<String>>,
}

impl CcrStatsRecorder {
    pub fn new(
        cluster_name: impl Into<String>,
        client: Arc<dyn StatsClient>,
        sink: Arc<dyn MetricsSink>,
        interval: SampleInterval,
        indices: Option<Vec<String>>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            client,
            sink,
            interval,
            indices,
        }
    }

    fn wanted(&self, index: &str) -> bool {
        self.indices
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|i| i == index))
    }
}

impl Recorder for CcrStatsRecorder {
    fn name(&self) -> String {
        format!("ccr-stats-{}", self.cluster_name)
    }

    fn record(&mut self) -> Result<()> {
        let stats = self
            .client
            .perform_request(CCR_STATS_PATH)
            .map_err(|e| {
                TelemetryError::transport("CCR stats", CCR_STATS_PATH, &self.cluster_name, e)
            })?;
        let Some(indices) = stats.as_object() else {
            return Ok(());
        };
        for (index, shards) in indices {
            if !self.wanted(index) {
                continue;
            }
            let Some(shards) = shards.as_object() else {
                continue;
            };
            for (shard, shard_stats) in shards {
                let meta = MetaData::from([
                    ("cluster".to_string(), self.cluster_name.clone()),
                    ("index".to_string(), index.clone()),
                    ("shard".to_string(), shard.clone()),
                ]);
                write_fields(
                    self.sink.as_ref(),
                    Target::Cluster,
                    "",
                    &CCR_FIELDS,
                    shard_stats,
                    &meta,
                )?;
            }
        }
        Ok(())
    }
}

/// Samples CCR stats on every configured cluster while the benchmark runs.
pub struct CcrStats {
    pending: Vec<CcrStatsRecorder>,
    samplers: Vec<PeriodicSampler>,
}

impl CcrStats {
    /// Validates `ccr-stats-sample-interval` and `ccr-stats-indices` against
    /// the configured clusters.
    pub fn new(
        params: &TelemetryParams,
        clients: &BTreeMap<String, Arc<dyn StatsClient>>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let interval =
            SampleInterval::new(SAMPLE_INTERVAL_PARAM, params.float(SAMPLE_INTERVAL_PARAM, 1.0)?)?;
        let mut indices = parse_indices(params)?;

        let unknown: Vec<&str> = indices
            .keys()
            .map(String::as_str)
            .filter(|k| !clients.contains_key(*k))
            .collect();
        if !unknown.is_empty() {
            let known: Vec<&str> = clients.keys().map(String::as_str).collect();
            return Err(TelemetryError::config(format!(
                "The telemetry parameter '{INDICES_PARAM}' must be a JSON Object with keys matching \
                 the cluster names [{}] specified in --target-hosts but it had [{}].",
                known.join(","),
                unknown.join(",")
            )));
        }

        let pending = clients
            .iter()
            .map(|(name, client)| {
                CcrStatsRecorder::new(
                    name.clone(),
                    Arc::clone(client),
                    Arc::clone(&sink),
                    interval,
                    indices.remove(name),
                )
            })
            .collect();
        Ok(Self {
            pending,
            samplers: Vec::new(),
        })
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    fn stop_sampling(&mut self) {
        for mut sampler in self.samplers.drain(..) {
            sampler.stop();
        }
    }
}

fn parse_indices(params: &TelemetryParams) -> Result<BTreeMap<String, Vec<String>>> {
    let Some(object) = params.object(INDICES_PARAM)? else {
        return Ok(BTreeMap::new());
    };
    object
        .iter()
        .map(|(cluster, indices)| -> Result<(String, Vec<String>)> {
            let names: Vec<String> = indices
                .as_array()
                .and_then(|a| a.iter().map(|v| v.as_str().map(str::to_string)).collect())
                .ok_or_else(|| {
                    TelemetryError::config(format!(
                        "The telemetry parameter '{INDICES_PARAM}' must map cluster [{cluster}] \
                         to a list of index names but it had {indices}."
                    ))
                })?;
            Ok((cluster.clone(), names))
        })
        .collect()
}

impl ClusterObserver for CcrStats {
    fn attach_to_cluster(&mut self, _cluster: &mut Cluster) -> Result<()> {
        for recorder in self.pending.drain(..) {
            let interval = recorder.interval;
            info!(
                "{}: sampling [{}] every {}s",
                INFO.human_name,
                recorder.cluster_name,
                interval.as_secs_f64()
            );
            self.samplers.push(PeriodicSampler::start(recorder, interval)?);
        }
        Ok(())
    }
}

impl LapObserver for CcrStats {
    fn on_benchmark_start(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_benchmark_stop(&mut self) -> Result<()> {
        self.stop_sampling();
        Ok(())
    }
}

impl NodeObserver for CcrStats {
    fn detach_from_node(&mut self, node: &Node, _running: bool) -> Result<()> {
        if !self.samplers.is_empty() {
            debug!(
                "{}: stopping {} sampler(s) on detach from [{}]",
                INFO.human_name,
                self.samplers.len(),
                node.node_name
            );
        }
        self.stop_sampling();
        Ok(())
    }
}

impl Device for CcrStats {
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
