//! Stats transport: the JSON endpoints devices and samplers read from.
//!
//! [`HttpStatsClient`] talks to a live cluster with a blocking `reqwest`
//! client. [`FixtureClient`] serves canned responses from memory or from a
//! directory of JSON files, for tests and offline replays.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, TransportError};

/// Path of the cluster-wide CCR follower stats endpoint.
pub const CCR_STATS_PATH: &str = "/_xpack/ccr/_stats";

/// Read-only access to a cluster's stats endpoints.
pub trait StatsClient: Send + Sync {
    /// Raw GET against `path`, decoded as JSON.
    fn perform_request(&self, path: &str) -> Result<Value, TransportError>;

    /// Cluster root info (`version.number`, `version.build_hash`, ...).
    fn cluster_info(&self) -> Result<Value, TransportError> {
        self.perform_request("/")
    }

    fn nodes_info(&self) -> Result<Value, TransportError> {
        self.perform_request("/_nodes")
    }

    /// Node stats restricted to `metrics` (e.g. `"jvm"`), or all when empty.
    fn nodes_stats(&self, metrics: &str) -> Result<Value, TransportError> {
        if metrics.is_empty() {
            self.perform_request("/_nodes/stats")
        } else {
            self.perform_request(&format!("/_nodes/stats/{metrics}"))
        }
    }

    /// Shard-level index stats for `metrics` (`"_all"` when empty).
    fn indices_stats(&self, metrics: &str) -> Result<Value, TransportError> {
        let metrics = if metrics.is_empty() { "_all" } else { metrics };
        self.perform_request(&format!("/_stats/{metrics}?level=shards"))
    }
}

/// Blocking HTTP client for one cluster.
pub struct HttpStatsClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpStatsClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl StatsClient for HttpStatsClient {
    fn perform_request(&self, path: &str) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| TransportError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }
        response.json::<Value>().map_err(|e| TransportError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

const CLUSTER_INFO: &str = "cluster_info";
const NODES_INFO: &str = "nodes_info";
const NODES_STATS: &str = "nodes_stats";
const INDICES_STATS: &str = "indices_stats";
const CCR_STATS: &str = "ccr_stats";

/// Canned responses keyed by endpoint.
///
/// Each endpoint holds a queue of responses. Every call pops the front until
/// one response is left, which is then repeated. This lets a fixture model
/// counters that move between benchmark start and stop.
#[derive(Debug, Default)]
pub struct FixtureClient {
    responses: Mutex<HashMap<String, Vec<Value>>>,
}

impl FixtureClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a raw request path.
    pub fn with_response(self, path: &str, response: Value) -> Self {
        self.push(path, response);
        self
    }

    pub fn with_cluster_info(self, response: Value) -> Self {
        self.with_response(CLUSTER_INFO, response)
    }

    pub fn with_nodes_info(self, response: Value) -> Self {
        self.with_response(NODES_INFO, response)
    }

    pub fn with_nodes_stats(self, response: Value) -> Self {
        self.with_response(NODES_STATS, response)
    }

    pub fn with_indices_stats(self, response: Value) -> Self {
        self.with_response(INDICES_STATS, response)
    }

    /// Load `cluster_info`, `nodes_info`, `nodes_stats`, `indices_stats` and
    /// `ccr_stats` fixtures from `dir`.
    ///
    /// `<name>.json` holds a single response; `<name>.<n>.json` files form a
    /// sequence ordered by `n`. Missing files leave the endpoint unavailable.
    pub fn from_dir(dir: impl AsRef<Path>) -> crate::error::Result<Self> {
        let client = Self::new();
        let mut files: Vec<(String, u32, std::path::PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let (name, seq) = match stem.rsplit_once('.') {
                Some((name, n)) => match n.parse::<u32>() {
                    Ok(n) => (name.to_string(), n),
                    Err(_) => continue,
                },
                None => (stem.to_string(), 0),
            };
            if [CLUSTER_INFO, NODES_INFO, NODES_STATS, INDICES_STATS, CCR_STATS]
                .contains(&name.as_str())
            {
                files.push((name, seq, path));
            }
        }
        files.sort();
        for (name, _, path) in files {
            let text = std::fs::read_to_string(&path)?;
            let value: Value = serde_json::from_str(&text)?;
            let key = if name == CCR_STATS {
                CCR_STATS_PATH.to_string()
            } else {
                name
            };
            client.push(&key, value);
        }
        Ok(client)
    }

    /// Endpoints with at least one response.
    pub fn endpoints(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn push(&self, key: &str, response: Value) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    fn next(&self, key: &str) -> Result<Value, TransportError> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.get_mut(key) {
            Some(queue) if queue.len() > 1 => Ok(queue.remove(0)),
            Some(queue) if !queue.is_empty() => Ok(queue[0].clone()),
            _ => Err(TransportError::Unavailable(key.to_string())),
        }
    }
}

impl StatsClient for FixtureClient {
    fn perform_request(&self, path: &str) -> Result<Value, TransportError> {
        self.next(path)
    }

    fn cluster_info(&self) -> Result<Value, TransportError> {
        self.next(CLUSTER_INFO)
    }

    fn nodes_info(&self) -> Result<Value, TransportError> {
        self.next(NODES_INFO)
    }

    fn nodes_stats(&self, _metrics: &str) -> Result<Value, TransportError> {
        self.next(NODES_STATS)
    }

    fn indices_stats(&self, _metrics: &str) -> Result<Value, TransportError> {
        self.next(INDICES_STATS)
    }
}
