//! Lifecycle dispatch across the active device set.
//!
//! Flow driven by the benchmark driver and the node supervisor:
//! 1. `instrument_candidate_env` before a node process is launched
//! 2. `on_pre_node_start` / `attach_to_node` around node startup
//! 3. `attach_to_cluster` once cluster-wide node metadata is known
//! 4. `on_benchmark_start` / `on_benchmark_stop` once per lap
//! 5. `detach_from_node` on shutdown
//!
//! Delivery is synchronous and follows registration order. The first device
//! error aborts delivery of that event to the remaining devices and is
//! returned to the caller.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::cluster::{Cluster, Node};
use crate::device::{Capabilities, Device, DeviceInfo, LaunchTarget};
use crate::error::Result;

/// Holds the active devices and fans lifecycle events out to them.
pub struct TelemetryDispatcher {
    devices: Vec<Box<dyn Device>>,
}

impl TelemetryDispatcher {
    /// Keep internal devices plus optional devices whose command is enabled.
    pub fn new(enabled: &[String], devices: Vec<Box<dyn Device>>) -> Self {
        let devices: Vec<Box<dyn Device>> = devices
            .into_iter()
            .filter(|d| {
                let info = d.info();
                info.internal || enabled.iter().any(|e| e == info.command)
            })
            .collect();
        for device in &devices {
            info!("telemetry device [{}] is active", device.name());
        }
        Self { devices }
    }

    /// Activate every given device regardless of its `internal` flag.
    pub fn with_devices(devices: Vec<Box<dyn Device>>) -> Self {
        Self { devices }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Metadata of the active devices, in registration order.
    pub fn device_infos(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(|d| d.info().clone()).collect()
    }

    /// Capabilities of the active devices, in registration order.
    pub fn capabilities(&mut self) -> Vec<(DeviceInfo, Capabilities)> {
        self.devices
            .iter_mut()
            .map(|d| (d.info().clone(), Capabilities::of(d.as_mut())))
            .collect()
    }

    /// Merge the environment contributed by every device for one node.
    ///
    /// A key contributed by more than one device gets its values joined by a
    /// single space, in registration order.
    pub fn instrument_candidate_env(
        &self,
        target: &LaunchTarget,
        node_name: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for device in &self.devices {
            let Some(contributor) = device.as_env_contributor() else {
                continue;
            };
            let env = contributor.instrument_env(target, node_name)?;
            if env.is_empty() {
                continue;
            }
            debug!(
                "device [{}] contributes {} environment variable(s) to [{}] ({})",
                device.name(),
                env.len(),
                node_name,
                target.name
            );
            merge_env(&mut merged, env);
        }
        Ok(merged)
    }

    pub fn on_pre_node_start(&mut self, node_name: &str) -> Result<()> {
        for device in &mut self.devices {
            if let Some(observer) = device.as_node_observer() {
                observer.on_pre_node_start(node_name)?;
            }
        }
        Ok(())
    }

    /// Later devices observe the enrichment done by earlier ones.
    pub fn attach_to_cluster(&mut self, cluster: &mut Cluster) -> Result<()> {
        for device in &mut self.devices {
            let name = device.name();
            if let Some(observer) = device.as_cluster_observer() {
                debug!("attaching [{}] to cluster [{}]", name, cluster.name);
                observer.attach_to_cluster(cluster)?;
            }
        }
        Ok(())
    }

    pub fn attach_to_node(&mut self, node: &Node) -> Result<()> {
        for device in &mut self.devices {
            let name = device.name();
            if let Some(observer) = device.as_node_observer() {
                debug!("attaching [{}] to node [{}]", name, node.node_name);
                observer.attach_to_node(node)?;
            }
        }
        Ok(())
    }

    pub fn detach_from_node(&mut self, node: &Node, running: bool) -> Result<()> {
        for device in &mut self.devices {
            let name = device.name();
            if let Some(observer) = device.as_node_observer() {
                debug!(
                    "detaching [{}] from node [{}] (running: {})",
                    name, node.node_name, running
                );
                observer.detach_from_node(node, running)?;
            }
        }
        Ok(())
    }

    pub fn on_benchmark_start(&mut self) -> Result<()> {
        for device in &mut self.devices {
            if let Some(observer) = device.as_lap_observer() {
                observer.on_benchmark_start()?;
            }
        }
        Ok(())
    }

    pub fn on_benchmark_stop(&mut self) -> Result<()> {
        for device in &mut self.devices {
            if let Some(observer) = device.as_lap_observer() {
                observer.on_benchmark_stop()?;
            }
        }
        Ok(())
    }
}

fn merge_env(merged: &mut BTreeMap<String, String>, env: BTreeMap<String, String>) {
    for (key, value) in env {
        merged
            .entry(key)
            .and_modify(|existing| {
                existing.push(' ');
                existing.push_str(&value);
            })
            .or_insert(value);
    }
}
