//! Node startup time: from the supervisor's launch to node attach.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use log::warn;

use crate::cluster::Node;
use crate::device::{Device, DeviceInfo, NodeObserver};
use crate::error::Result;
use crate::sink::MetricsSink;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "startup-time",
    human_name: "Startup Time",
    help: "Measures the time it takes to start a node",
    internal: true,
};

pub struct StartupTime {
    sink: Arc<dyn MetricsSink>,
    started: HashMap<String, Instant>,
}

impl StartupTime {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            started: HashMap::new(),
        }
    }
}

impl NodeObserver for StartupTime {
    fn on_pre_node_start(&mut self, node_name: &str) -> Result<()> {
        self.started.insert(node_name.to_string(), Instant::now());
        Ok(())
    }

    fn attach_to_node(&mut self, node: &Node) -> Result<()> {
        match self.started.remove(&node.node_name) {
            Some(start) => self.sink.put_value_node(
                &node.node_name,
                "node_startup_time",
                start.elapsed().as_secs_f64(),
                Some("s"),
            ),
            None => {
                warn!(
                    "no start time recorded for node [{}]; skipping startup time",
                    node.node_name
                );
                Ok(())
            }
        }
    }
}

impl Device for StartupTime {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_node_observer(&mut self) -> Option<&mut dyn NodeObserver> {
        Some(self)
    }
}
