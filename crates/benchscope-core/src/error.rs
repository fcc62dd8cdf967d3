//! Error taxonomy for telemetry setup, collection and storage.

use thiserror::Error;

/// Failure of a [`StatsClient`](crate::client::StatsClient) call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The endpoint answered with a non-success status code.
    #[error("endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body was not valid JSON.
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The client has no data for the requested endpoint.
    #[error("no response available for endpoint {0}")]
    Unavailable(String),
}

/// Errors raised by devices, samplers and sinks.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid device configuration. Raised at construction, never retried.
    #[error("{0}")]
    Config(String),

    /// Fetching source stats from a cluster failed.
    #[error(
        "A transport error occurred while collecting {device} from the endpoint [{endpoint}] on cluster [{cluster}]"
    )]
    Transport {
        device: String,
        endpoint: String,
        cluster: String,
        #[source]
        source: TransportError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TelemetryError {
    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap a transport failure with the collecting device, endpoint and cluster.
    pub fn transport(
        device: impl Into<String>,
        endpoint: impl Into<String>,
        cluster: impl Into<String>,
        source: TransportError,
    ) -> Self {
        Self::Transport {
            device: device.into(),
            endpoint: endpoint.into(),
            cluster: cluster.into(),
            source,
        }
    }

    /// Whether a periodic sampler should keep ticking after this error.
    ///
    /// Transport and I/O failures are transient; the next tick tries again.
    /// Configuration and programming errors will not heal on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Io(_))
    }

    /// Whether this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result alias used across the crate.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_names_device_endpoint_and_cluster() {
        let err = TelemetryError::transport(
            "CCR stats",
            "/_ccr/stats",
            "remote",
            TransportError::Unavailable("/_ccr/stats".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "A transport error occurred while collecting CCR stats from the endpoint \
             [/_ccr/stats] on cluster [remote]"
        );
        assert!(err.is_retryable());
        assert!(!err.is_config());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        let err = TelemetryError::config("bad interval");
        assert!(err.is_config());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "bad interval");
    }

    #[test]
    fn transport_error_exposes_source() {
        use std::error::Error as _;
        let err = TelemetryError::transport(
            "node stats",
            "/_nodes/stats",
            "default",
            TransportError::Status {
                url: "http://localhost:9200/_nodes/stats".to_string(),
                status: 503,
            },
        );
        let source = err.source().map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("endpoint http://localhost:9200/_nodes/stats returned HTTP 503")
        );
    }
}
