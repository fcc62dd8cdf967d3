//! Device contract: metadata plus one trait per lifecycle capability.
//!
//! Every device implements [`Device`]. A device opts into lifecycle events by
//! implementing the matching capability trait and returning itself from the
//! corresponding `as_*` accessor; the dispatcher asks each device for its
//! capabilities instead of requiring every hook on every device.

use std::collections::BTreeMap;

use crate::cluster::{Cluster, Node};
use crate::error::Result;

/// Static metadata describing a device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Name used to enable the device (e.g. `"jfr"`).
    pub command: &'static str,
    /// Human-readable name used in log lines and error messages.
    pub human_name: &'static str,
    /// One-line description.
    pub help: &'static str,
    /// Internal devices are always active; others must be enabled by command.
    pub internal: bool,
}

/// What the supervisor is about to launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Name of the launch configuration (e.g. `"defaults"`).
    pub name: String,
}

impl LaunchTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Contributes environment variables to a node process before it starts.
pub trait EnvironmentContributor {
    fn instrument_env(
        &self,
        target: &LaunchTarget,
        node_name: &str,
    ) -> Result<BTreeMap<String, String>>;
}

/// Observes the cluster once its node metadata is available.
pub trait ClusterObserver {
    /// May enrich `cluster` and its nodes in place.
    fn attach_to_cluster(&mut self, cluster: &mut Cluster) -> Result<()>;
}

/// Observes individual nodes. Every hook defaults to a no-op.
pub trait NodeObserver {
    fn on_pre_node_start(&mut self, _node_name: &str) -> Result<()> {
        Ok(())
    }

    fn attach_to_node(&mut self, _node: &Node) -> Result<()> {
        Ok(())
    }

    /// `running` is `false` once the node process has stopped.
    fn detach_from_node(&mut self, _node: &Node, _running: bool) -> Result<()> {
        Ok(())
    }
}

/// Observes benchmark laps.
pub trait LapObserver {
    fn on_benchmark_start(&mut self) -> Result<()>;

    fn on_benchmark_stop(&mut self) -> Result<()>;
}

/// A pluggable observer owned by the dispatcher.
pub trait Device: Send {
    fn info(&self) -> &DeviceInfo;

    /// Convenience: human name from info.
    fn name(&self) -> &'static str {
        self.info().human_name
    }

    fn as_env_contributor(&self) -> Option<&dyn EnvironmentContributor> {
        None
    }

    fn as_cluster_observer(&mut self) -> Option<&mut dyn ClusterObserver> {
        None
    }

    fn as_node_observer(&mut self) -> Option<&mut dyn NodeObserver> {
        None
    }

    fn as_lap_observer(&mut self) -> Option<&mut dyn LapObserver> {
        None
    }
}

/// Which lifecycle capabilities a device exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub env: bool,
    pub cluster: bool,
    pub node: bool,
    pub lap: bool,
}

impl Capabilities {
    /// Probe a device for its capabilities.
    pub fn of(device: &mut dyn Device) -> Self {
        Self {
            env: device.as_env_contributor().is_some(),
            cluster: device.as_cluster_observer().is_some(),
            node: device.as_node_observer().is_some(),
            lap: device.as_lap_observer().is_some(),
        }
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = [
            (self.env, "env"),
            (self.cluster, "cluster"),
            (self.node, "node"),
            (self.lap, "lap"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", names.join(","))
    }
}
