//! Cluster and node records shared by the dispatcher and the devices.
//!
//! A [`Cluster`] is an arena of [`Node`]s addressed by node name. Devices get
//! `&mut Cluster` only while `attach_to_cluster` is being delivered; every
//! other hook sees shared references.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Operating system details reported by a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// JVM details reported by a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JvmInfo {
    pub vendor: Option<String>,
    pub version: Option<String>,
}

/// Processor counts as seen by the node process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub available_processors: Option<u64>,
    /// Absent on old (1.x) clusters.
    pub allocated_processors: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_bytes: Option<u64>,
}

/// One data path of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsInfo {
    pub mount: String,
    #[serde(rename = "type")]
    pub fs_type: String,
    /// `"true"`, `"false"` or `"unknown"`.
    pub spins: String,
}

/// A cluster node. The process itself belongs to the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub node_name: String,
    pub host_name: String,
    pub pid: Option<u32>,
    pub ip: Option<String>,
    pub os: OsInfo,
    pub jvm: JvmInfo,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub fs: Vec<FsInfo>,
    pub plugins: Vec<String>,
    /// Log directory of this node, when the supervisor knows it.
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub data_paths: Vec<PathBuf>,
}

impl Node {
    pub fn new(host_name: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            host_name: host_name.into(),
            ..Self::default()
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn with_data_paths(mut self, data_paths: Vec<PathBuf>) -> Self {
        self.data_paths = data_paths;
        self
    }
}

/// The benchmarked cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Name used to address the cluster (e.g. `default`).
    pub name: String,
    pub hosts: Vec<String>,
    pub nodes: Vec<Node>,
    pub distribution_version: Option<String>,
    pub source_revision: Option<String>,
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new("default", Vec::new(), Vec::new())
    }
}

impl Cluster {
    pub fn new(name: impl Into<String>, hosts: Vec<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            hosts,
            nodes,
            distribution_version: None,
            source_revision: None,
        }
    }

    /// Look up a node by name.
    pub fn node(&self, node_name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_name == node_name)
    }

    /// Look up a node by name for in-place enrichment.
    pub fn node_mut(&mut self, node_name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.node_name == node_name)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.node_name.as_str()).collect()
    }
}
