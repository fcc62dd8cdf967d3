//! Merge time per Lucene index part, parsed from the node's log files.
//!
//! Lines of the form `<N> msec to merge <part> [<M> docs]` are summed per
//! part across every file of a node's log directory. A node's own
//! [`Node::log_dir`] is used when set; otherwise the configured directory,
//! which belongs to the first node attached without one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::cluster::Node;
use crate::device::{Device, DeviceInfo, LapObserver, NodeObserver};
use crate::error::Result;
use crate::sink::MetricsSink;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "merge-parts",
    human_name: "Merge Parts",
    help: "Gathers merge parts time statistics",
    internal: true,
};

/// Accumulated merge time and documents of one index part.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartTotals {
    pub time_ms: u64,
    pub docs: u64,
}

pub struct MergeParts {
    sink: Arc<dyn MetricsSink>,
    node_log_dir: PathBuf,
    /// Attached nodes and the log directory scanned for each.
    log_dirs: BTreeMap<String, PathBuf>,
    shared_owner: Option<String>,
}

impl MergeParts {
    pub fn new(sink: Arc<dyn MetricsSink>, node_log_dir: impl Into<PathBuf>) -> Self {
        Self {
            sink,
            node_log_dir: node_log_dir.into(),
            log_dirs: BTreeMap::new(),
            shared_owner: None,
        }
    }

    fn log_dir_of(&mut self, node: &Node) -> Option<PathBuf> {
        if let Some(dir) = &node.log_dir {
            return Some(dir.clone());
        }
        match &self.shared_owner {
            Some(owner) if *owner != node.node_name => {
                warn!(
                    "node log directory [{}] already belongs to [{owner}]; no merge parts for [{}]",
                    self.node_log_dir.display(),
                    node.node_name
                );
                None
            }
            _ => {
                self.shared_owner = Some(node.node_name.clone());
                Some(self.node_log_dir.clone())
            }
        }
    }

    fn store(&self, node: &str, log_dir: &Path) -> Result<()> {
        if !log_dir.is_dir() {
            warn!(
                "node log directory [{}] does not exist; skipping merge parts",
                log_dir.display()
            );
            return Ok(());
        }
        for (part, totals) in scan_log_dir(log_dir)? {
            self.sink.put_value_node(
                node,
                &format!("merge_parts_total_time_{part}"),
                totals.time_ms as f64,
                Some("ms"),
            )?;
            self.sink.put_count_node(
                node,
                &format!("merge_parts_total_docs_{part}"),
                totals.docs as i64,
                None,
            )?;
        }
        Ok(())
    }
}

fn scan_log_dir(log_dir: &Path) -> Result<BTreeMap<String, PartTotals>> {
    let mut totals = BTreeMap::new();
    for entry in std::fs::read_dir(log_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let bytes = std::fs::read(&path)?;
        debug!("scanning [{}] for merge times", path.display());
        accumulate(&String::from_utf8_lossy(&bytes), &mut totals);
    }
    Ok(totals)
}

/// Add every merge line of `text` to `totals`, keyed by part name.
pub fn accumulate(text: &str, totals: &mut BTreeMap<String, PartTotals>) {
    for line in text.lines() {
        if let Some((part, time_ms, docs)) = parse_merge_line(line) {
            let entry = totals.entry(part).or_default();
            entry.time_ms += time_ms;
            entry.docs += docs;
        }
    }
}

/// `... <N> msec to merge <part> [<M> docs]` → (`part` with spaces as `_`, N, M).
fn parse_merge_line(line: &str) -> Option<(String, u64, u64)> {
    let (before, after) = line.split_once(" msec to merge ")?;
    let time_ms = before.split_whitespace().last()?.parse().ok()?;
    let (part, rest) = after.split_once(" [")?;
    let docs = rest.strip_suffix(']').unwrap_or(rest).trim();
    let docs = docs.strip_suffix("docs")?.trim().parse().ok()?;
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    Some((part.replace(' ', "_"), time_ms, docs))
}

impl NodeObserver for MergeParts {
    fn attach_to_node(&mut self, node: &Node) -> Result<()> {
        if let Some(dir) = self.log_dir_of(node) {
            self.log_dirs.insert(node.node_name.clone(), dir);
        }
        Ok(())
    }
}

impl LapObserver for MergeParts {
    fn on_benchmark_start(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_benchmark_stop(&mut self) -> Result<()> {
        for (node, log_dir) in &self.log_dirs {
            self.store(node, log_dir)?;
        }
        Ok(())
    }
}

impl Device for MergeParts {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_node_observer(&mut self) -> Option<&mut dyn NodeObserver> {
        Some(self)
    }

    fn as_lap_observer(&mut self) -> Option<&mut dyn LapObserver> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{InMemorySink, Reading, Record};

    const LOG: &str = "
        INFO: System starting up
        INFO: 100 msec to merge doc values [500 docs]
        INFO: Something unrelated
        INFO: 250 msec to merge doc values [1350 docs]
        INFO: System shutting down
        ";

    fn reading(sink: &InMemorySink, name: &str) -> (Reading, Option<String>) {
        match sink.metrics_named(name).as_slice() {
            [Record::Metric { reading, unit, .. }] => (*reading, unit.clone()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_merge_lines() {
        assert_eq!(
            parse_merge_line("INFO: 100 msec to merge doc values [500 docs]"),
            Some(("doc_values".to_string(), 100, 500))
        );
        assert_eq!(
            parse_merge_line("[2018] 7 msec to merge postings [3 docs]"),
            Some(("postings".to_string(), 7, 3))
        );
        assert_eq!(parse_merge_line("INFO: Something unrelated"), None);
        assert_eq!(parse_merge_line("x msec to merge doc values [1 docs]"), None);
    }

    #[test]
    fn stores_summed_metrics_per_part() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("server.log"), LOG).unwrap();
        let sink = Arc::new(InMemorySink::new());
        let mut device = MergeParts::new(sink.clone(), dir.path());

        device.attach_to_node(&Node::new("io", "rally0")).unwrap();
        device.on_benchmark_stop().unwrap();

        assert_eq!(
            reading(&sink, "merge_parts_total_time_doc_values"),
            (Reading::Value(350.0), Some("ms".to_string()))
        );
        assert_eq!(
            reading(&sink, "merge_parts_total_docs_doc_values"),
            (Reading::Count(1850), None)
        );
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn sums_across_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "10 msec to merge norms [1 docs]\n").unwrap();
        std::fs::write(dir.path().join("b.log"), "5 msec to merge norms [2 docs]\n").unwrap();
        let sink = Arc::new(InMemorySink::new());
        let mut device = MergeParts::new(sink.clone(), dir.path());
        device.attach_to_node(&Node::new("io", "rally0")).unwrap();
        device.on_benchmark_stop().unwrap();
        assert_eq!(
            reading(&sink, "merge_parts_total_time_norms").0,
            Reading::Value(15.0)
        );
    }

    #[test]
    fn stores_nothing_if_no_metrics_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("server.log"), "no data to parse").unwrap();
        let sink = Arc::new(InMemorySink::new());
        let mut device = MergeParts::new(sink.clone(), dir.path());
        device.attach_to_node(&Node::new("io", "rally0")).unwrap();
        device.on_benchmark_stop().unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn missing_log_dir_is_skipped() {
        let sink = Arc::new(InMemorySink::new());
        let mut device = MergeParts::new(sink.clone(), "/nonexistent/benchscope/logs");
        device.attach_to_node(&Node::new("io", "rally0")).unwrap();
        device.on_benchmark_stop().unwrap();
        assert!(sink.is_empty());
    }

    fn owners(sink: &InMemorySink, name: &str) -> Vec<(Option<String>, Reading)> {
        sink.metrics_named(name)
            .into_iter()
            .filter_map(|r| match r {
                Record::Metric { node, reading, .. } => Some((node, reading)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn each_node_reads_its_own_log_dir() {
        let logs0 = tempfile::tempdir().unwrap();
        let logs1 = tempfile::tempdir().unwrap();
        std::fs::write(logs0.path().join("server.log"), "10 msec to merge doc values [1 docs]\n").unwrap();
        std::fs::write(logs1.path().join("server.log"), "30 msec to merge doc values [4 docs]\n").unwrap();
        let sink = Arc::new(InMemorySink::new());
        let mut device = MergeParts::new(sink.clone(), "/nonexistent/benchscope/logs");

        device
            .attach_to_node(&Node::new("io", "rally0").with_log_dir(logs0.path()))
            .unwrap();
        device
            .attach_to_node(&Node::new("io", "rally1").with_log_dir(logs1.path()))
            .unwrap();
        device.on_benchmark_stop().unwrap();

        assert_eq!(
            owners(&sink, "merge_parts_total_time_doc_values"),
            vec![
                (Some("rally0".to_string()), Reading::Value(10.0)),
                (Some("rally1".to_string()), Reading::Value(30.0)),
            ]
        );
        assert_eq!(
            owners(&sink, "merge_parts_total_docs_doc_values"),
            vec![
                (Some("rally0".to_string()), Reading::Count(1)),
                (Some("rally1".to_string()), Reading::Count(4)),
            ]
        );
    }

    #[test]
    fn configured_log_dir_belongs_to_the_first_node() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("server.log"), LOG).unwrap();
        let sink = Arc::new(InMemorySink::new());
        let mut device = MergeParts::new(sink.clone(), dir.path());

        device.attach_to_node(&Node::new("io", "rally0")).unwrap();
        device.attach_to_node(&Node::new("io", "rally1")).unwrap();
        // re-attaching the owner keeps the directory
        device.attach_to_node(&Node::new("io", "rally0")).unwrap();
        device.on_benchmark_stop().unwrap();

        assert_eq!(
            owners(&sink, "merge_parts_total_time_doc_values"),
            vec![(Some("rally0".to_string()), Reading::Value(350.0))]
        );
        assert_eq!(sink.len(), 2);
    }
}
