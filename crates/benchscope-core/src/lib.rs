//! # benchscope-core
//!
//! **Pluggable telemetry for a cluster under benchmark.**
//!
//! `benchscope-core` drives a set of telemetry *devices* through the lifecycle
//! of a benchmark: before a node starts, once the cluster is known, around
//! every benchmark lap and when a node shuts down. Devices contribute JVM
//! flags, enrich cluster metadata, sample stats endpoints in the background
//! and write what they observe to a [`MetricsSink`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use benchscope_core::{
//!     Cluster, DeviceContext, InMemorySink, Node, TelemetryConfig, TelemetryDispatcher,
//!     build_devices,
//! };
//!
//! let config = TelemetryConfig::default();
//! let sink = Arc::new(InMemorySink::new());
//! let ctx = DeviceContext::connect(config.clone(), sink.clone()).unwrap();
//! let mut telemetry = TelemetryDispatcher::new(&config.devices, build_devices(&ctx).unwrap());
//!
//! let mut cluster = Cluster::new("default", vec!["localhost:9200".into()], vec![Node::new("localhost", "rally0")]);
//! telemetry.attach_to_cluster(&mut cluster).unwrap();
//! telemetry.on_benchmark_start().unwrap();
//! // ... run the benchmark ...
//! telemetry.on_benchmark_stop().unwrap();
//! println!("{} records", sink.len());
//! ```
//!
//! ## Architecture
//!
//! Supervisor → Dispatcher → Devices → Sink
//!
//! Devices declare what they take part in through capability traits
//! ([`EnvironmentContributor`], [`ClusterObserver`], [`NodeObserver`],
//! [`LapObserver`]). Sampling devices run a [`PeriodicSampler`] on their own
//! thread between cluster attach and benchmark stop.

pub mod client;
pub mod cluster;
pub mod config;
pub mod delta;
pub mod device;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod fields;
pub mod promotion;
pub mod sampler;
pub mod sink;
pub mod sysstats;

pub use client::{CCR_STATS_PATH, FixtureClient, HttpStatsClient, StatsClient};
pub use cluster::{Cluster, CpuInfo, FsInfo, JvmInfo, MemoryInfo, Node, OsInfo};
pub use config::{TelemetryConfig, TelemetryParams};
pub use delta::{LapDelta, Snapshot};
pub use device::{
    Capabilities, ClusterObserver, Device, DeviceInfo, EnvironmentContributor, LapObserver,
    LaunchTarget, NodeObserver,
};
pub use devices::{DeviceContext, build_devices, catalogue};
pub use dispatcher::TelemetryDispatcher;
pub use error::{Result, TelemetryError, TransportError};
pub use fields::{Field, FieldKind, Target};
pub use promotion::MetaInfoPass;
pub use sampler::{PeriodicSampler, Recorder, SampleInterval, SamplerStats};
pub use sink::{
    InMemorySink, JsonLinesSink, MetaData, MetaInfoScope, MetricsSink, NopSink, Reading, Record,
    StoredRecord,
};
pub use sysstats::{LocalSystem, StaticSystem, SystemProbe};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
