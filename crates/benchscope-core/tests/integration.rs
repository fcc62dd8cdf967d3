//! Integration tests for benchscope-core.
//!
//! These tests drive the full device set through a benchmark lifecycle:
//! env instrumentation → node start → cluster attach → lap → node stop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use benchscope_core::devices::index_size::IndexSize;
use benchscope_core::devices::merge_parts::MergeParts;
use benchscope_core::{
    Cluster, Device, DeviceContext, FixtureClient, InMemorySink, JsonLinesSink, LaunchTarget,
    MetaInfoScope, MetricsSink, Node, Reading, Record, StaticSystem, StatsClient, StoredRecord,
    TelemetryConfig, TelemetryDispatcher, build_devices,
};
use serde_json::{Value, json};

const NODE_ID: &str = "FCFjozkeTiOpN-SI88YEcg";

fn nodes_stats(young: u64, old: u64) -> Value {
    json!({"nodes": {NODE_ID: {
        "name": "rally0",
        "host": "127.0.0.1",
        "os": {"mem": {"total_in_bytes": 17179869184u64}},
        "fs": {"data": [{"mount": "/data", "type": "ext4", "spins": "false"}]},
        "jvm": {"gc": {"collectors": {
            "young": {"collection_time_in_millis": young},
            "old": {"collection_time_in_millis": old}
        }}}
    }}})
}

fn indices_stats(merges: u64) -> Value {
    json!({"_all": {
        "primaries": {
            "segments": {"count": 3},
            "merges": {"total_time_in_millis": merges, "total_throttled_time_in_millis": 0},
            "indexing": {"index_time_in_millis": 0},
            "refresh": {"total_time_in_millis": 0},
            "flush": {"total_time_in_millis": 0}
        },
        "total": {"store": {"size_in_bytes": 4096}}
    }})
}

/// `cluster_reads` is the number of node stats reads during cluster attach.
fn fixture(cluster_reads: usize) -> FixtureClient {
    let mut client = FixtureClient::new()
        .with_cluster_info(json!({"version": {"number": "7.10.2", "build_hash": "747e1cc"}}))
        .with_nodes_info(json!({"nodes": {NODE_ID: {
            "name": "rally0",
            "ip": "127.0.0.1",
            "os": {"name": "Linux", "version": "5.10", "available_processors": 8, "allocated_processors": 8},
            "jvm": {"version": "15.0.1", "vm_vendor": "AdoptOpenJDK"},
            "plugins": [{"name": "repository-s3"}]
        }}}))
        .with_indices_stats(indices_stats(100))
        .with_indices_stats(indices_stats(350));
    for _ in 0..cluster_reads {
        client = client.with_nodes_stats(nodes_stats(500, 1000));
    }
    // lap start, lap stop
    client
        .with_nodes_stats(nodes_stats(500, 1000))
        .with_nodes_stats(nodes_stats(1200, 2500))
}

fn context(config: TelemetryConfig, sink: Arc<dyn MetricsSink>, client: FixtureClient) -> DeviceContext {
    let clients: BTreeMap<String, Arc<dyn StatsClient>> =
        BTreeMap::from([("default".to_string(), Arc::new(client) as Arc<dyn StatsClient>)]);
    DeviceContext::new(config, sink, clients).with_system(Arc::new(StaticSystem {
        os_name: Some("Linux".to_string()),
        os_version: Some("5.10".to_string()),
        logical_cpu_cores: Some(8),
        physical_cpu_cores: Some(4),
        cpu_model: Some("Intel(R) Xeon(R)".to_string()),
    }))
}

fn value_of(sink: &InMemorySink, name: &str) -> f64 {
    match sink.metrics_named(name).as_slice() {
        [Record::Metric { reading, .. }] => reading.as_f64(),
        other => panic!("expected one [{name}] metric, got {other:?}"),
    }
}

/// Runs one node through one lap and returns its (enriched) cluster.
fn run_lifecycle(telemetry: &mut TelemetryDispatcher) -> (BTreeMap<String, String>, Cluster) {
    let node = Node::new("127.0.0.1", "rally0").with_pid(4242);
    let env = telemetry
        .instrument_candidate_env(&LaunchTarget::new("defaults"), "rally0")
        .unwrap();
    telemetry.on_pre_node_start("rally0").unwrap();
    telemetry.attach_to_node(&node).unwrap();

    let mut cluster = Cluster::new("default", vec!["127.0.0.1:9200".to_string()], vec![node]);
    telemetry.attach_to_cluster(&mut cluster).unwrap();
    telemetry.on_benchmark_start().unwrap();
    telemetry.on_benchmark_stop().unwrap();

    let node = cluster.nodes[0].clone();
    telemetry.detach_from_node(&node, true).unwrap();
    telemetry.detach_from_node(&node, false).unwrap();
    (env, cluster)
}

#[test]
fn full_lifecycle_with_provisioned_cluster() {
    let logs = tempfile::tempdir().unwrap();
    let server_logs = logs.path().join("server");
    std::fs::create_dir_all(&server_logs).unwrap();
    std::fs::write(
        server_logs.join("rally0.log"),
        "[INFO] 120 msec to merge postings [3000 docs]\n[INFO] started\n",
    )
    .unwrap();
    let data = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("segments_1"), vec![0_u8; 512]).unwrap();

    let config = TelemetryConfig {
        devices: vec!["jfr".to_string(), "gc".to_string()],
        log_root: logs.path().join("telemetry"),
        node_log_dir: server_logs,
        data_paths: vec![data.path().to_path_buf()],
        java_major_version: 11,
        ..TelemetryConfig::default()
    };
    let sink = Arc::new(InMemorySink::new());
    let ctx = context(config.clone(), sink.clone(), fixture(1));
    let mut telemetry = TelemetryDispatcher::new(&config.devices, build_devices(&ctx).unwrap());

    let (env, cluster) = run_lifecycle(&mut telemetry);

    // Both env contributors share ES_JAVA_OPTS, JFR first.
    let opts = &env["ES_JAVA_OPTS"];
    assert!(opts.starts_with("-XX:+UnlockDiagnosticVMOptions"), "{opts}");
    assert!(opts.contains(" -Xlog:gc*"), "{opts}");
    assert_eq!(env.len(), 1);

    // Cluster enrichment
    assert_eq!(cluster.distribution_version.as_deref(), Some("7.10.2"));
    let node = &cluster.nodes[0];
    assert_eq!(node.jvm.vendor.as_deref(), Some("AdoptOpenJDK"));
    assert_eq!(node.memory.total_bytes, Some(17179869184));
    assert_eq!(node.fs[0].spins, "false");
    assert_eq!(node.plugins, vec!["repository-s3"]);

    // Lap metrics
    assert_eq!(value_of(&sink, "node_young_gen_gc_time"), 700.0);
    assert_eq!(value_of(&sink, "node_total_old_gen_gc_time"), 1500.0);
    let merges: Vec<Value> = sink
        .docs()
        .into_iter()
        .filter(|(_, doc)| doc["name"] == "merges_total_time")
        .map(|(_, doc)| doc["value"].clone())
        .collect();
    assert_eq!(merges, vec![json!(250)]);
    assert_eq!(value_of(&sink, "segments_count"), 3.0);
    assert_eq!(value_of(&sink, "store_size_in_bytes"), 4096.0);

    // Node-local metrics
    assert!(value_of(&sink, "node_startup_time") >= 0.0);
    assert_eq!(value_of(&sink, "merge_parts_total_time_postings"), 120.0);
    assert_eq!(value_of(&sink, "merge_parts_total_docs_postings"), 3000.0);
    assert_eq!(value_of(&sink, "final_index_size_bytes"), 512.0);

    // Meta-info
    let meta = sink.meta_infos();
    assert!(meta.contains(&(
        MetaInfoScope::Node,
        Some("rally0".to_string()),
        "cpu_physical_cores".to_string(),
        json!(4)
    )));
    assert!(meta.contains(&(
        MetaInfoScope::Cluster,
        None,
        "jvm_vendor".to_string(),
        json!("AdoptOpenJDK")
    )));
    assert!(meta.contains(&(
        MetaInfoScope::Cluster,
        None,
        "source_revision".to_string(),
        json!("747e1cc")
    )));
}

#[test]
fn external_cluster_uses_remote_devices_only() {
    let config = TelemetryConfig {
        external_cluster: true,
        ..TelemetryConfig::default()
    };
    let sink = Arc::new(InMemorySink::new());
    let ctx = context(config.clone(), sink.clone(), fixture(2));
    let mut telemetry = TelemetryDispatcher::new(&config.devices, build_devices(&ctx).unwrap());

    let (env, _) = run_lifecycle(&mut telemetry);

    assert!(env.is_empty());
    assert!(sink.metrics_named("node_startup_time").is_empty());
    assert!(sink.metrics_named("final_index_size_bytes").is_empty());
    let meta = sink.meta_infos();
    assert!(meta.contains(&(
        MetaInfoScope::Node,
        Some("rally0".to_string()),
        "host_name".to_string(),
        json!("127.0.0.1")
    )));
    assert!(
        !meta
            .iter()
            .any(|(scope, _, key, _)| *scope == MetaInfoScope::Cluster && key == "host_name")
    );
}

#[test]
fn node_stats_sampler_runs_between_attach_and_stop() {
    let config = TelemetryConfig {
        devices: vec!["node-stats".to_string()],
        external_cluster: true,
        params: benchscope_core::TelemetryParams::new().with("node-stats-sample-interval", 0.01),
        ..TelemetryConfig::default()
    };
    let client = FixtureClient::new()
        .with_indices_stats(indices_stats(0))
        .with_nodes_stats(json!({"nodes": {NODE_ID: {
        "name": "rally0",
        "host": "127.0.0.1",
        "transport": {"rx_count": 10, "rx_size_in_bytes": 2048},
        "jvm": {"gc": {"collectors": {
            "young": {"collection_time_in_millis": 5},
            "old": {"collection_time_in_millis": 7}
        }}}
    }}}));
    let sink = Arc::new(InMemorySink::new());
    let ctx = context(config.clone(), sink.clone(), client);
    let mut telemetry = TelemetryDispatcher::new(&config.devices, build_devices(&ctx).unwrap());

    let mut cluster = Cluster::new("default", Vec::new(), vec![Node::new("127.0.0.1", "rally0")]);
    telemetry.attach_to_cluster(&mut cluster).unwrap();
    telemetry.on_benchmark_start().unwrap();
    std::thread::sleep(Duration::from_millis(60));
    telemetry.on_benchmark_stop().unwrap();

    let samples = sink.metrics_named("transport_rx_count").len();
    assert!(samples >= 1, "expected at least one sample");
    // Stopped: nothing more arrives.
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(sink.metrics_named("transport_rx_count").len(), samples);
    match &sink.metrics_named("transport_rx_size_in_bytes")[0] {
        Record::Metric { reading, unit, .. } => {
            assert_eq!(*reading, Reading::Value(2048.0));
            assert_eq!(unit.as_deref(), Some("byte"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn json_lines_sink_records_a_whole_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics").join("run.jsonl");
    let sink = Arc::new(JsonLinesSink::with_run_id(&path, "run-1").unwrap());
    let config = TelemetryConfig {
        external_cluster: true,
        ..TelemetryConfig::default()
    };
    let ctx = context(config.clone(), sink.clone(), fixture(2));
    let mut telemetry = TelemetryDispatcher::new(&config.devices, build_devices(&ctx).unwrap());
    run_lifecycle(&mut telemetry);

    let text = std::fs::read_to_string(&path).unwrap();
    let records: Vec<StoredRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.run_id == "run-1"));
    assert!(records.iter().any(|r| matches!(
        &r.record,
        Record::Metric { name, reading: Reading::Value(v), .. }
            if name == "node_total_young_gen_gc_time" && *v == 700.0
    )));
}

#[test]
fn fixtures_replay_from_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("cluster_info.json"),
        r#"{"version": {"number": "8.1.0", "build_hash": "abc"}}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("nodes_info.json"),
        r#"{"nodes": {"a": {"name": "rally0", "jvm": {"vm_vendor": "Eclipse Adoptium"}}}}"#,
    )
    .unwrap();
    let client = FixtureClient::from_dir(dir.path()).unwrap();
    let sink = Arc::new(InMemorySink::new());
    let ctx = context(TelemetryConfig::default(), sink.clone(), client);
    let mut telemetry = TelemetryDispatcher::with_devices(build_devices(&ctx).unwrap());

    let mut cluster = Cluster::new("default", Vec::new(), vec![Node::new("local", "rally0")]);
    telemetry.attach_to_cluster(&mut cluster).unwrap();

    assert_eq!(cluster.distribution_version.as_deref(), Some("8.1.0"));
    assert_eq!(cluster.nodes[0].jvm.vendor.as_deref(), Some("Eclipse Adoptium"));
    // No stats fixtures: the lap fails on the first stats read.
    let err = telemetry.on_benchmark_start().unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("on cluster [default]"));
}

#[test]
fn node_local_devices_keep_nodes_apart() {
    let logs0 = tempfile::tempdir().unwrap();
    let logs1 = tempfile::tempdir().unwrap();
    std::fs::write(logs0.path().join("server.log"), "40 msec to merge norms [8 docs]\n").unwrap();
    std::fs::write(logs1.path().join("server.log"), "90 msec to merge norms [2 docs]\n").unwrap();
    let data0 = tempfile::tempdir().unwrap();
    let data1 = tempfile::tempdir().unwrap();
    std::fs::write(data0.path().join("segments_1"), vec![0_u8; 64]).unwrap();
    std::fs::write(data1.path().join("segments_1"), vec![0_u8; 256]).unwrap();

    let sink = Arc::new(InMemorySink::new());
    let devices: Vec<Box<dyn Device>> = vec![
        Box::new(MergeParts::new(sink.clone(), "/nonexistent/benchscope/logs")),
        Box::new(IndexSize::new(Vec::new(), sink.clone())),
    ];
    let mut telemetry = TelemetryDispatcher::with_devices(devices);
    let nodes = [
        Node::new("127.0.0.1", "rally0")
            .with_log_dir(logs0.path())
            .with_data_paths(vec![data0.path().to_path_buf()]),
        Node::new("127.0.0.1", "rally1")
            .with_log_dir(logs1.path())
            .with_data_paths(vec![data1.path().to_path_buf()]),
    ];
    for node in &nodes {
        telemetry.attach_to_node(node).unwrap();
    }
    telemetry.on_benchmark_start().unwrap();
    telemetry.on_benchmark_stop().unwrap();
    for node in &nodes {
        telemetry.detach_from_node(node, false).unwrap();
    }

    let per_node = |name: &str| -> Vec<(Option<String>, f64)> {
        sink.metrics_named(name)
            .into_iter()
            .filter_map(|r| match r {
                Record::Metric { node, reading, .. } => Some((node, reading.as_f64())),
                _ => None,
            })
            .collect()
    };
    assert_eq!(
        per_node("merge_parts_total_time_norms"),
        vec![(Some("rally0".to_string()), 40.0), (Some("rally1".to_string()), 90.0)]
    );
    assert_eq!(
        per_node("final_index_size_bytes"),
        vec![(Some("rally0".to_string()), 64.0), (Some("rally1".to_string()), 256.0)]
    );
}
