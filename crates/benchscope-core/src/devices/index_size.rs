//! Final on-disk size of a node's data paths.
//!
//! A node's own [`Node::data_paths`] are measured when set; otherwise the
//! configured paths, which belong to the first node measured without any.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::cluster::Node;
use crate::device::{Device, DeviceInfo, NodeObserver};
use crate::error::Result;
use crate::sink::MetricsSink;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "index-size",
    human_name: "Index Size",
    help: "Measures the final size of the index",
    internal: true,
};

pub struct IndexSize {
    data_paths: Vec<PathBuf>,
    sink: Arc<dyn MetricsSink>,
    shared_owner: Option<String>,
}

impl IndexSize {
    pub fn new(data_paths: Vec<PathBuf>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            data_paths,
            sink,
            shared_owner: None,
        }
    }

    fn data_paths_of(&mut self, node: &Node) -> Vec<PathBuf> {
        if !node.data_paths.is_empty() {
            return node.data_paths.clone();
        }
        if self.data_paths.is_empty() {
            return Vec::new();
        }
        match &self.shared_owner {
            Some(owner) if *owner != node.node_name => {
                warn!(
                    "data paths already measured for [{owner}]; no index size for [{}]",
                    node.node_name
                );
                Vec::new()
            }
            _ => {
                self.shared_owner = Some(node.node_name.clone());
                self.data_paths.clone()
            }
        }
    }
}

/// Total size in bytes of all regular files below `path`.
///
/// Symlinks are not followed.
pub fn disk_usage(path: &Path) -> Result<u64> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    if !meta.is_dir() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += disk_usage(&entry?.path())?;
    }
    Ok(total)
}

impl NodeObserver for IndexSize {
    fn detach_from_node(&mut self, node: &Node, running: bool) -> Result<()> {
        if running {
            return Ok(());
        }
        let data_paths = self.data_paths_of(node);
        if data_paths.is_empty() {
            return Ok(());
        }
        let mut total = 0_u64;
        for path in &data_paths {
            if !path.exists() {
                warn!("data path [{}] does not exist; skipping", path.display());
                continue;
            }
            total += disk_usage(path)?;
        }
        debug!("final index size of [{}] is {total} bytes", node.node_name);
        self.sink.put_count_node(
            &node.node_name,
            "final_index_size_bytes",
            i64::try_from(total).unwrap_or(i64::MAX),
            Some("byte"),
        )
    }
}

impl Device for IndexSize {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_node_observer(&mut self) -> Option<&mut dyn NodeObserver> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{InMemorySink, Reading, Record};

    #[test]
    fn stores_index_size_once_the_node_stopped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("segment_1"), vec![0_u8; 1000]).unwrap();
        std::fs::create_dir(dir.path().join("translog")).unwrap();
        std::fs::write(dir.path().join("translog").join("t.tlog"), vec![0_u8; 24]).unwrap();

        let sink = Arc::new(InMemorySink::new());
        let mut device = IndexSize::new(vec![dir.path().to_path_buf()], sink.clone());
        let node = Node::new("io", "rally0");

        device.detach_from_node(&node, true).unwrap();
        assert!(sink.is_empty());

        device.detach_from_node(&node, false).unwrap();
        match sink.metrics_named("final_index_size_bytes").as_slice() {
            [Record::Metric { node, reading, unit, .. }] => {
                assert_eq!(node.as_deref(), Some("rally0"));
                assert_eq!(*reading, Reading::Count(1024));
                assert_eq!(unit.as_deref(), Some("byte"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stores_nothing_without_data_paths() {
        let sink = Arc::new(InMemorySink::new());
        let mut device = IndexSize::new(Vec::new(), sink.clone());
        device
            .detach_from_node(&Node::new("io", "rally0"), false)
            .unwrap();
        assert!(sink.is_empty());
    }

    fn sizes(sink: &InMemorySink) -> Vec<(Option<String>, Reading)> {
        sink.metrics_named("final_index_size_bytes")
            .into_iter()
            .filter_map(|r| match r {
                Record::Metric { node, reading, .. } => Some((node, reading)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn each_node_measures_its_own_data_paths() {
        let data0 = tempfile::tempdir().unwrap();
        let data1 = tempfile::tempdir().unwrap();
        std::fs::write(data0.path().join("segment_1"), vec![0_u8; 2048]).unwrap();
        std::fs::write(data1.path().join("segment_1"), vec![0_u8; 16384]).unwrap();
        let sink = Arc::new(InMemorySink::new());
        let mut device = IndexSize::new(Vec::new(), sink.clone());

        let node0 = Node::new("io", "rally0").with_data_paths(vec![data0.path().to_path_buf()]);
        let node1 = Node::new("io", "rally1").with_data_paths(vec![data1.path().to_path_buf()]);
        device.detach_from_node(&node0, false).unwrap();
        device.detach_from_node(&node1, false).unwrap();

        assert_eq!(
            sizes(&sink),
            vec![
                (Some("rally0".to_string()), Reading::Count(2048)),
                (Some("rally1".to_string()), Reading::Count(16384)),
            ]
        );
    }

    #[test]
    fn configured_data_paths_are_measured_for_one_node() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("segment_1"), vec![0_u8; 100]).unwrap();
        let sink = Arc::new(InMemorySink::new());
        let mut device = IndexSize::new(vec![dir.path().to_path_buf()], sink.clone());

        device.detach_from_node(&Node::new("io", "rally0"), false).unwrap();
        device.detach_from_node(&Node::new("io", "rally1"), false).unwrap();

        assert_eq!(sizes(&sink), vec![(Some("rally0".to_string()), Reading::Count(100))]);
    }
}
