//! Built-in telemetry devices.

pub mod ccr_stats;
pub mod cluster_meta;
pub mod env_info;
pub mod gc;
pub mod gc_times;
pub mod index_size;
pub mod index_stats;
pub mod jfr;
pub mod merge_parts;
pub mod node_stats;
pub mod startup_time;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::{HttpStatsClient, StatsClient};
use crate::config::TelemetryConfig;
use crate::device::{Device, DeviceInfo};
use crate::error::{Result, TelemetryError};
use crate::sink::MetricsSink;
use crate::sysstats::{LocalSystem, SystemProbe};

/// Everything the built-in devices are constructed from.
pub struct DeviceContext {
    pub config: TelemetryConfig,
    pub sink: Arc<dyn MetricsSink>,
    /// One client per configured cluster, keyed by cluster name.
    pub clients: BTreeMap<String, Arc<dyn StatsClient>>,
    pub system: Arc<dyn SystemProbe>,
}

impl DeviceContext {
    pub fn new(
        config: TelemetryConfig,
        sink: Arc<dyn MetricsSink>,
        clients: BTreeMap<String, Arc<dyn StatsClient>>,
    ) -> Self {
        Self {
            config,
            sink,
            clients,
            system: Arc::new(LocalSystem),
        }
    }

    /// Connect an HTTP client to every cluster of `config`.
    pub fn connect(config: TelemetryConfig, sink: Arc<dyn MetricsSink>) -> Result<Self> {
        let mut clients: BTreeMap<String, Arc<dyn StatsClient>> = BTreeMap::new();
        for (name, url) in &config.clusters {
            let client = HttpStatsClient::new(url.as_str())
                .map_err(|e| TelemetryError::transport("cluster info", url.as_str(), name.as_str(), e))?;
            clients.insert(name.clone(), Arc::new(client));
        }
        Ok(Self::new(config, sink, clients))
    }

    pub fn with_system(mut self, system: Arc<dyn SystemProbe>) -> Self {
        self.system = system;
        self
    }

    /// Name and client of the benchmarked cluster.
    pub fn primary(&self) -> Result<(String, Arc<dyn StatsClient>)> {
        let name = self
            .config
            .primary_cluster()
            .ok_or_else(|| TelemetryError::config("No cluster is configured."))?;
        let client = self.clients.get(name).ok_or_else(|| {
            TelemetryError::config(format!("No client is configured for cluster [{name}]."))
        })?;
        Ok((name.to_string(), Arc::clone(client)))
    }
}

/// Metadata of every built-in device, optional ones first.
pub fn catalogue() -> Vec<DeviceInfo> {
    vec![
        jfr::INFO,
        gc::INFO,
        node_stats::INFO,
        ccr_stats::INFO,
        startup_time::INFO,
        merge_parts::INFO,
        index_size::INFO,
        env_info::NODE_INFO,
        env_info::CLUSTER_INFO,
        env_info::EXTERNAL_INFO,
        cluster_meta::INFO,
        gc_times::INFO,
        index_stats::INFO,
    ]
}

/// Build the device set for one run, in registration order.
///
/// Optional devices are only constructed when enabled, so their parameters
/// are validated here and nowhere else. Node-local devices are left out for
/// external clusters.
pub fn build_devices(ctx: &DeviceContext) -> Result<Vec<Box<dyn Device>>> {
    let config = &ctx.config;
    let (cluster_name, client) = ctx.primary()?;
    let sink = &ctx.sink;
    let mut devices: Vec<Box<dyn Device>> = Vec::new();

    if !config.external_cluster {
        // Env contributors
        if config.is_enabled(jfr::INFO.command) {
            devices.push(Box::new(jfr::FlightRecorder::new(
                &config.params,
                &config.log_root,
                config.java_major_version,
            )?));
        }
        if config.is_enabled(gc::INFO.command) {
            devices.push(Box::new(gc::Gc::new(&config.log_root, config.java_major_version)));
        }
        // Node-local
        devices.push(Box::new(startup_time::StartupTime::new(Arc::clone(sink))));
        devices.push(Box::new(merge_parts::MergeParts::new(
            Arc::clone(sink),
            &config.node_log_dir,
        )));
        devices.push(Box::new(index_size::IndexSize::new(
            config.data_paths.clone(),
            Arc::clone(sink),
        )));
        devices.push(Box::new(env_info::NodeEnvironmentInfo::new(
            Arc::clone(sink),
            Arc::clone(&ctx.system),
        )));
    }

    // Cluster-wide
    devices.push(Box::new(cluster_meta::ClusterMetaDataInfo::new(Arc::clone(&client))));
    if config.external_cluster {
        devices.push(Box::new(env_info::ExternalEnvironmentInfo::new(
            Arc::clone(&client),
            Arc::clone(sink),
        )));
    } else {
        devices.push(Box::new(env_info::ClusterEnvironmentInfo::new(
            Arc::clone(&client),
            Arc::clone(sink),
        )));
    }

    // Samplers
    if config.is_enabled(node_stats::INFO.command) {
        devices.push(Box::new(node_stats::NodeStats::new(
            &config.params,
            cluster_name.as_str(),
            Arc::clone(&client),
            Arc::clone(sink),
        )?));
    }
    if config.is_enabled(ccr_stats::INFO.command) {
        devices.push(Box::new(ccr_stats::CcrStats::new(
            &config.params,
            &ctx.clients,
            Arc::clone(sink),
        )?));
    }

    // Lap diffs
    devices.push(Box::new(gc_times::GcTimesSummary::new(
        cluster_name.as_str(),
        Arc::clone(&client),
        Arc::clone(sink),
    )));
    devices.push(Box::new(index_stats::IndexStats::new(
        cluster_name,
        client,
        Arc::clone(sink),
    )));
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FixtureClient;
    use crate::sink::NopSink;
    use crate::sysstats::StaticSystem;
    use serde_json::json;

    fn context(config: TelemetryConfig) -> DeviceContext {
        let clients: BTreeMap<String, Arc<dyn StatsClient>> = config
            .clusters
            .keys()
            .map(|name| {
                let client: Arc<dyn StatsClient> = Arc::new(FixtureClient::new());
                (name.clone(), client)
            })
            .collect();
        DeviceContext::new(config, Arc::new(NopSink), clients)
            .with_system(Arc::new(StaticSystem::default()))
    }

    fn commands(devices: &[Box<dyn Device>]) -> Vec<&'static str> {
        devices.iter().map(|d| d.info().command).collect()
    }

    #[test]
    fn internal_devices_only_by_default() {
        let devices = build_devices(&context(TelemetryConfig::default())).unwrap();
        assert_eq!(
            commands(&devices),
            vec![
                "startup-time",
                "merge-parts",
                "index-size",
                "node-env-info",
                "cluster-meta-data",
                "cluster-env-info",
                "gc-times",
                "index-stats",
            ]
        );
    }

    #[test]
    fn enabled_optional_devices_are_built() {
        let config = TelemetryConfig {
            devices: vec!["jfr".to_string(), "gc".to_string(), "node-stats".to_string()],
            ..TelemetryConfig::default()
        };
        let devices = build_devices(&context(config)).unwrap();
        let commands = commands(&devices);
        assert_eq!(&commands[..2], &["jfr", "gc"]);
        assert!(commands.contains(&"node-stats"));
        assert!(!commands.contains(&"ccr-stats"));
    }

    #[test]
    fn external_clusters_skip_node_local_devices() {
        let config = TelemetryConfig {
            devices: vec!["jfr".to_string()],
            external_cluster: true,
            ..TelemetryConfig::default()
        };
        let devices = build_devices(&context(config)).unwrap();
        assert_eq!(
            commands(&devices),
            vec!["cluster-meta-data", "external-env-info", "gc-times", "index-stats"]
        );
    }

    #[test]
    fn invalid_parameters_fail_construction() {
        let mut config = TelemetryConfig {
            devices: vec!["node-stats".to_string()],
            ..TelemetryConfig::default()
        };
        config.params = config.params.with("node-stats-sample-interval", json!(-1));
        let err = build_devices(&context(config)).err().unwrap();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "The telemetry parameter 'node-stats-sample-interval' must be greater than zero but was -1."
        );
    }

    #[test]
    fn catalogue_commands_are_unique() {
        let mut commands: Vec<&str> = catalogue().iter().map(|i| i.command).collect();
        let total = commands.len();
        commands.sort_unstable();
        commands.dedup();
        assert_eq!(commands.len(), total);
    }
}
