use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use benchscope_core::{
    Cluster, DeviceContext, FixtureClient, InMemorySink, JsonLinesSink, MetricsSink, Node, Result,
    StatsClient, TelemetryConfig, TelemetryDispatcher, TelemetryError, build_devices,
};
use log::{info, warn};

pub struct RunCommandConfig<'a> {
    pub config_path: Option<&'a str>,
    pub devices: Option<&'a str>,
    pub duration_secs: Option<f64>,
    pub fixtures_dir: Option<&'a str>,
    /// `None` prints records to stdout once the lap ends.
    pub output_path: Option<&'a str>,
}

pub fn run(cmd: RunCommandConfig<'_>) -> Result<()> {
    let mut config = super::load_config(cmd.config_path)?;
    if let Some(devices) = cmd.devices {
        config.devices.extend(
            devices
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        );
    }
    // We attach to a cluster someone else started.
    config.external_cluster = true;

    let memory = Arc::new(InMemorySink::new());
    let sink: Arc<dyn MetricsSink> = match cmd.output_path {
        Some(path) => {
            let sink = JsonLinesSink::create(path)?;
            println!("Recording run {} to {}", sink.run_id(), sink.path().display());
            Arc::new(sink)
        }
        None => memory.clone(),
    };

    let ctx = match cmd.fixtures_dir {
        Some(dir) => fixture_context(config.clone(), Arc::clone(&sink), dir)?,
        None => DeviceContext::connect(config.clone(), Arc::clone(&sink))?,
    };
    let (cluster_name, client) = ctx.primary()?;
    let mut cluster = discover_cluster(&config, &cluster_name, client.as_ref())?;
    println!(
        "Observing cluster [{}] with {} node(s): {}",
        cluster.name,
        cluster.nodes.len(),
        cluster.node_names().join(", ")
    );

    let mut telemetry = TelemetryDispatcher::new(&config.devices, build_devices(&ctx)?);
    telemetry.attach_to_cluster(&mut cluster)?;
    telemetry.on_benchmark_start()?;
    wait_for_lap_end(cmd.duration_secs)?;
    telemetry.on_benchmark_stop()?;

    if cmd.output_path.is_none() {
        for record in memory.records() {
            println!("{}", serde_json::to_string(&record)?);
        }
    }
    info!("lap finished");
    Ok(())
}

/// Serve the primary cluster from `dir`; other clusters get empty fixtures.
fn fixture_context(
    config: TelemetryConfig,
    sink: Arc<dyn MetricsSink>,
    dir: &str,
) -> Result<DeviceContext> {
    let primary = config
        .primary_cluster()
        .ok_or_else(|| TelemetryError::config("No cluster is configured."))?
        .to_string();
    let mut clients: BTreeMap<String, Arc<dyn StatsClient>> = BTreeMap::new();
    for name in config.clusters.keys() {
        let client = if *name == primary {
            FixtureClient::from_dir(dir)?
        } else {
            FixtureClient::new()
        };
        clients.insert(name.clone(), Arc::new(client));
    }
    Ok(DeviceContext::new(config, sink, clients))
}

/// Build the node set from what the cluster reports.
fn discover_cluster(
    config: &TelemetryConfig,
    cluster_name: &str,
    client: &dyn StatsClient,
) -> Result<Cluster> {
    let info = client
        .nodes_info()
        .map_err(|e| TelemetryError::transport("nodes info", "/_nodes", cluster_name, e))?;
    let nodes: Vec<Node> = info["nodes"]
        .as_object()
        .map(|nodes| {
            nodes
                .values()
                .filter_map(|n| {
                    let name = n["name"].as_str()?;
                    let host = n["host"].as_str().unwrap_or("unknown");
                    Some(Node::new(host, name))
                })
                .collect()
        })
        .unwrap_or_default();
    if nodes.is_empty() {
        warn!("cluster [{cluster_name}] reports no nodes");
    }
    let hosts = config.clusters.get(cluster_name).cloned().into_iter().collect();
    Ok(Cluster::new(cluster_name, hosts, nodes))
}

fn wait_for_lap_end(duration_secs: Option<f64>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| TelemetryError::Io(std::io::Error::other(e.to_string())))?;

    let limit = match duration_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            println!("Benchmark lap running for {secs}s...");
            Some(Duration::from_secs_f64(secs))
        }
        Some(secs) => {
            return Err(TelemetryError::config(format!(
                "The lap duration must be greater than zero but was {secs}."
            )));
        }
        None => {
            println!("Benchmark lap running until Ctrl+C...");
            None
        }
    };

    let start = Instant::now();
    while running.load(Ordering::SeqCst) {
        if limit.is_some_and(|max| start.elapsed() >= max) {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}
