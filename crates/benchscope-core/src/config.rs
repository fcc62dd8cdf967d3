//! Run configuration and device parameters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TelemetryError};

/// Free-form device parameters (`--telemetry-params`), read through typed
/// accessors. A present value of the wrong type is a configuration error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryParams(Map<String, Value>);

impl TelemetryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a JSON object; anything else is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(TelemetryError::config(format!(
                "Telemetry parameters must be a JSON object but were {other}."
            ))),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn float(&self, key: &str, default: f64) -> Result<f64> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| wrong_type(key, "a number", v)),
        }
    }

    pub fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| wrong_type(key, "a boolean", v)),
        }
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "a string", v)),
        }
    }

    pub fn object(&self, key: &str) -> Result<Option<&Map<String, Value>>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_object()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "a JSON Object", v)),
        }
    }
}

fn wrong_type(key: &str, expected: &str, actual: &Value) -> TelemetryError {
    TelemetryError::config(format!(
        "The telemetry parameter '{key}' must be {expected} but was {actual}."
    ))
}

/// Everything needed to build the device set for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Commands of the optional devices to enable.
    pub devices: Vec<String>,
    pub params: TelemetryParams,
    /// Directory receiving per-node JFR recordings and GC logs.
    pub log_root: PathBuf,
    /// Directory holding the node's own log files.
    pub node_log_dir: PathBuf,
    /// Node data paths measured by the index size device.
    pub data_paths: Vec<PathBuf>,
    /// The cluster was not provisioned by us; only remote devices apply.
    pub external_cluster: bool,
    pub java_major_version: u32,
    /// Cluster name to base URL. The first entry in name order is the
    /// benchmarked cluster unless one is called `default`.
    pub clusters: BTreeMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            params: TelemetryParams::default(),
            log_root: PathBuf::from("logs"),
            node_log_dir: PathBuf::from("logs/server"),
            data_paths: Vec::new(),
            external_cluster: false,
            java_major_version: 8,
            clusters: BTreeMap::from([(
                "default".to_string(),
                "http://localhost:9200".to_string(),
            )]),
        }
    }
}

impl TelemetryConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Name of the benchmarked cluster.
    pub fn primary_cluster(&self) -> Option<&str> {
        if self.clusters.contains_key("default") {
            Some("default")
        } else {
            self.clusters.keys().next().map(String::as_str)
        }
    }

    pub fn is_enabled(&self, command: &str) -> bool {
        self.devices.iter().any(|d| d == command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_accessors_use_defaults_when_absent() {
        let params = TelemetryParams::new();
        assert_eq!(params.float("node-stats-sample-interval", 1.0).unwrap(), 1.0);
        assert!(!params.bool("node-stats-include-indices", false).unwrap());
        assert_eq!(params.str("recording-template").unwrap(), None);
        assert!(params.object("ccr-stats-indices").unwrap().is_none());
    }

    #[test]
    fn wrong_types_are_config_errors() {
        let params = TelemetryParams::new()
            .with("node-stats-include-indices", "yes")
            .with("ccr-stats-indices", json!(["follower"]));
        let err = params.bool("node-stats-include-indices", false).unwrap_err();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "The telemetry parameter 'node-stats-include-indices' must be a boolean but was \"yes\"."
        );
        assert!(params.object("ccr-stats-indices").unwrap_err().is_config());
    }

    #[test]
    fn params_must_be_an_object() {
        assert!(TelemetryParams::from_value(json!([1, 2])).unwrap_err().is_config());
        assert_eq!(TelemetryParams::from_value(Value::Null).unwrap(), TelemetryParams::new());
    }

    #[test]
    fn config_loads_from_json_with_defaults() {
        let config = TelemetryConfig::from_json_str(
            r#"{
                "devices": ["jfr", "node-stats"],
                "params": {"node-stats-sample-interval": 5},
                "java_major_version": 11
            }"#,
        )
        .unwrap();
        assert!(config.is_enabled("jfr"));
        assert!(!config.is_enabled("gc"));
        assert_eq!(config.java_major_version, 11);
        assert_eq!(config.params.float("node-stats-sample-interval", 1.0).unwrap(), 5.0);
        assert_eq!(config.log_root, PathBuf::from("logs"));
        assert_eq!(config.primary_cluster(), Some("default"));
    }

    #[test]
    fn config_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.json");
        std::fs::write(
            &path,
            r#"{"clusters": {"leader": "http://a:9200", "follower": "http://b:9200"}}"#,
        )
        .unwrap();
        let config = TelemetryConfig::load(&path).unwrap();
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.primary_cluster(), Some("follower"));
    }
}
