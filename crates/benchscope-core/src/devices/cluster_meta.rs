//! Enriches the in-memory [`Cluster`] and its nodes with what the cluster
//! reports about itself, for later devices and for the final report.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::client::StatsClient;
use crate::cluster::{Cluster, FsInfo, Node};
use crate::device::{ClusterObserver, Device, DeviceInfo};
use crate::devices::env_info::plugin_names;
use crate::error::Result;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "cluster-meta-data",
    human_name: "Cluster Meta Data",
    help: "Enriches cluster and node records with versions, hardware and plugins",
    internal: true,
};

pub struct ClusterMetaDataInfo {
    client: Arc<dyn StatsClient>,
}

impl ClusterMetaDataInfo {
    pub fn new(client: Arc<dyn StatsClient>) -> Self {
        Self { client }
    }
}

fn str_field(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

/// Apply one node's `nodes_info` and `nodes_stats` entries to `node`.
fn enrich_node(node: &mut Node, info: &Value, stats: Option<&Value>) {
    let os = &info["os"];
    node.ip = str_field(&info["ip"]);
    node.os.name = str_field(&os["name"]);
    node.os.version = str_field(&os["version"]);
    node.jvm.vendor = str_field(&info["jvm"]["vm_vendor"]);
    node.jvm.version = str_field(&info["jvm"]["version"]);
    node.cpu.available_processors = os["available_processors"].as_u64();
    // 1.x clusters do not report allocated processors.
    node.cpu.allocated_processors = os["allocated_processors"].as_u64();
    // Memory moved from nodes info (1.x) to nodes stats.
    node.memory.total_bytes = stats
        .and_then(|s| s["os"]["mem"]["total_in_bytes"].as_u64())
        .or_else(|| os["mem"]["total_in_bytes"].as_u64());
    if let Some(data) = stats.and_then(|s| s["fs"]["data"].as_array()) {
        node.fs = data
            .iter()
            .map(|fs| FsInfo {
                mount: str_field(&fs["mount"]).unwrap_or_default(),
                fs_type: str_field(&fs["type"]).unwrap_or_default(),
                spins: match &fs["spins"] {
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    _ => "unknown".to_string(),
                },
            })
            .collect();
    }
    if let Some(plugins) = plugin_names(info) {
        node.plugins = plugins;
    }
}

impl ClusterObserver for ClusterMetaDataInfo {
    fn attach_to_cluster(&mut self, cluster: &mut Cluster) -> Result<()> {
        match self.client.cluster_info() {
            Ok(info) => {
                cluster.distribution_version = str_field(&info["version"]["number"]);
                cluster.source_revision = str_field(&info["version"]["build_hash"]);
            }
            Err(e) => warn!("could not retrieve cluster version info: {e}"),
        }

        let stats = self.client.nodes_stats("os,fs").unwrap_or_else(|e| {
            warn!("could not retrieve node stats: {e}");
            Value::Null
        });
        let info = match self.client.nodes_info() {
            Ok(info) => info,
            Err(e) => {
                warn!("could not retrieve nodes info: {e}");
                return Ok(());
            }
        };
        let Some(info_nodes) = info["nodes"].as_object() else {
            return Ok(());
        };
        for (node_id, node_info) in info_nodes {
            let Some(name) = node_info["name"].as_str() else {
                continue;
            };
            match cluster.node_mut(name) {
                Some(node) => enrich_node(node, node_info, stats["nodes"].get(node_id)),
                None => debug!("cluster reports node [{name}] that is not part of the benchmark"),
            }
        }
        Ok(())
    }
}

impl Device for ClusterMetaDataInfo {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_cluster_observer(&mut self) -> Option<&mut dyn ClusterObserver> {
        Some(self)
    }
}
