//! Environment meta-info: which OS, JVM, plugins and attributes the benchmark
//! ran against.
//!
//! [`NodeEnvironmentInfo`] probes the local host of each provisioned node.
//! [`ClusterEnvironmentInfo`] and [`ExternalEnvironmentInfo`] read the
//! cluster's own view via the nodes info API; values shared by every node are
//! also recorded at cluster scope (see [`MetaInfoPass`]).

use std::sync::Arc;

use log::warn;
use serde_json::{Value, json};

use crate::client::StatsClient;
use crate::cluster::{Cluster, Node};
use crate::device::{ClusterObserver, Device, DeviceInfo, NodeObserver};
use crate::error::Result;
use crate::promotion::MetaInfoPass;
use crate::sink::{MetaInfoScope, MetricsSink};
use crate::sysstats::SystemProbe;

pub const NODE_INFO: DeviceInfo = DeviceInfo {
    command: "node-env-info",
    human_name: "Node Environment Info",
    help: "Gathers OS and CPU facts of the hosts running the nodes",
    internal: true,
};

pub const CLUSTER_INFO: DeviceInfo = DeviceInfo {
    command: "cluster-env-info",
    human_name: "Cluster Environment Info",
    help: "Gathers distribution, JVM, plugin and attribute facts of the cluster",
    internal: true,
};

pub const EXTERNAL_INFO: DeviceInfo = DeviceInfo {
    command: "external-env-info",
    human_name: "External Environment Info",
    help: "Gathers environment facts of a cluster not provisioned by benchscope",
    internal: true,
};

/// Host facts of each node's machine.
pub struct NodeEnvironmentInfo {
    sink: Arc<dyn MetricsSink>,
    system: Arc<dyn SystemProbe>,
}

impl NodeEnvironmentInfo {
    pub fn new(sink: Arc<dyn MetricsSink>, system: Arc<dyn SystemProbe>) -> Self {
        Self { sink, system }
    }
}

impl NodeObserver for NodeEnvironmentInfo {
    fn attach_to_node(&mut self, node: &Node) -> Result<()> {
        let name = node.node_name.as_str();
        let facts = [
            ("os_name", self.system.os_name().map(Value::from)),
            ("os_version", self.system.os_version().map(Value::from)),
            ("cpu_logical_cores", self.system.logical_cpu_cores().map(Value::from)),
            ("cpu_physical_cores", self.system.physical_cpu_cores().map(Value::from)),
            ("cpu_model", self.system.cpu_model().map(Value::from)),
            ("node_name", Some(Value::from(name))),
            ("host_name", Some(Value::from(node.host_name.as_str()))),
        ];
        for (key, value) in facts {
            if let Some(value) = value {
                self.sink
                    .add_meta_info(MetaInfoScope::Node, Some(name), key, value)?;
            }
        }
        Ok(())
    }
}

impl Device for NodeEnvironmentInfo {
    fn info(&self) -> &DeviceInfo {
        &NODE_INFO
    }

    fn as_node_observer(&mut self) -> Option<&mut dyn NodeObserver> {
        Some(self)
    }
}

/// Distribution version and build hash at cluster scope.
fn add_distribution_info(client: &dyn StatsClient, sink: &dyn MetricsSink) -> Result<()> {
    let info = match client.cluster_info() {
        Ok(info) => info,
        Err(e) => {
            warn!("could not retrieve cluster version info: {e}");
            return Ok(());
        }
    };
    let version = &info["version"];
    if let Some(revision) = version["build_hash"].as_str() {
        sink.add_meta_info(MetaInfoScope::Cluster, None, "source_revision", json!(revision))?;
    }
    if let Some(number) = version["number"].as_str() {
        sink.add_meta_info(MetaInfoScope::Cluster, None, "distribution_version", json!(number))?;
    }
    Ok(())
}

/// Installed plugin names of a nodes-info entry, if the node reports any.
pub(crate) fn plugin_names(node_info: &Value) -> Option<Vec<String>> {
    node_info.get("plugins").and_then(Value::as_array).map(|plugins| {
        plugins
            .iter()
            .filter_map(|p| p["name"].as_str().map(str::to_string))
            .collect()
    })
}

/// JVM, plugin and attribute facts of one nodes-info entry.
fn add_node_facts(pass: &mut MetaInfoPass, node: &str, node_info: &Value) {
    pass.add_opt(node, "jvm_vendor", node_info["jvm"]["vm_vendor"].as_str());
    pass.add_opt(node, "jvm_version", node_info["jvm"]["version"].as_str());
    pass.add_opt(node, "plugins", plugin_names(node_info));
    if let Some(attributes) = node_info.get("attributes").and_then(Value::as_object) {
        for (key, value) in attributes {
            pass.add(node, &format!("attribute_{key}"), value.clone());
        }
    }
}

fn nodes_info(client: &dyn StatsClient) -> Option<serde_json::Map<String, Value>> {
    match client.nodes_info() {
        Ok(mut info) => match info.get_mut("nodes").map(Value::take) {
            Some(Value::Object(nodes)) => Some(nodes),
            _ => None,
        },
        Err(e) => {
            warn!("could not retrieve nodes info: {e}");
            None
        }
    }
}

/// Cluster-level environment facts of a provisioned cluster.
pub struct ClusterEnvironmentInfo {
    client: Arc<dyn StatsClient>,
    sink: Arc<dyn MetricsSink>,
}

impl ClusterEnvironmentInfo {
    pub fn new(client: Arc<dyn StatsClient>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { client, sink }
    }
}

impl ClusterObserver for ClusterEnvironmentInfo {
    fn attach_to_cluster(&mut self, _cluster: &mut Cluster) -> Result<()> {
        add_distribution_info(self.client.as_ref(), self.sink.as_ref())?;
        let Some(nodes) = nodes_info(self.client.as_ref()) else {
            return Ok(());
        };
        let names: Vec<String> = nodes
            .values()
            .filter_map(|n| n["name"].as_str().map(str::to_string))
            .collect();
        let mut pass = MetaInfoPass::new(names);
        for node_info in nodes.values() {
            if let Some(name) = node_info["name"].as_str() {
                add_node_facts(&mut pass, name, node_info);
            }
        }
        pass.flush(self.sink.as_ref())
    }
}

impl Device for ClusterEnvironmentInfo {
    fn info(&self) -> &DeviceInfo {
        &CLUSTER_INFO
    }

    fn as_cluster_observer(&mut self) -> Option<&mut dyn ClusterObserver> {
        Some(self)
    }
}

/// All environment facts of a cluster benchscope did not provision; the
/// nodes' hosts cannot be probed locally so everything comes from the API.
pub struct ExternalEnvironmentInfo {
    client: Arc<dyn StatsClient>,
    sink: Arc<dyn MetricsSink>,
}

impl ExternalEnvironmentInfo {
    pub fn new(client: Arc<dyn StatsClient>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { client, sink }
    }
}

impl ClusterObserver for ExternalEnvironmentInfo {
    fn attach_to_cluster(&mut self, _cluster: &mut Cluster) -> Result<()> {
        add_distribution_info(self.client.as_ref(), self.sink.as_ref())?;
        let stats = match self.client.nodes_stats("") {
            Ok(stats) => stats,
            Err(e) => {
                warn!("could not retrieve node stats: {e}");
                return Ok(());
            }
        };
        let Some(stats_nodes) = stats["nodes"].as_object() else {
            return Ok(());
        };
        let info_nodes = nodes_info(self.client.as_ref()).unwrap_or_default();

        let names: Vec<String> = stats_nodes
            .values()
            .filter_map(|n| n["name"].as_str().map(str::to_string))
            .collect();
        let mut pass = MetaInfoPass::new(names);
        for (node_id, node_stats) in stats_nodes {
            let Some(name) = node_stats["name"].as_str() else {
                continue;
            };
            pass.add(name, "node_name", json!(name));
            pass.add(
                name,
                "host_name",
                json!(node_stats["host"].as_str().unwrap_or("unknown")),
            );
            let Some(node_info) = info_nodes.get(node_id) else {
                continue;
            };
            pass.add_opt(name, "os_name", node_info["os"]["name"].as_str());
            pass.add_opt(name, "os_version", node_info["os"]["version"].as_str());
            pass.add_opt(
                name,
                "cpu_logical_cores",
                node_info["os"]["available_processors"].as_u64(),
            );
            add_node_facts(&mut pass, name, node_info);
        }
        pass.flush(self.sink.as_ref())
    }
}

impl Device for ExternalEnvironmentInfo {
    fn info(&self) -> &DeviceInfo {
        &EXTERNAL_INFO
    }

    fn as_cluster_observer(&mut self) -> Option<&mut dyn ClusterObserver> {
        Some(self)
    }
}
