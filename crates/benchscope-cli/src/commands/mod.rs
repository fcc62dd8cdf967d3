pub mod devices;
pub mod env;
pub mod replay;
pub mod run;

use benchscope_core::{Result, TelemetryConfig};

/// Load the telemetry config at `path`, or the defaults when none is given.
pub fn load_config(path: Option<&str>) -> Result<TelemetryConfig> {
    match path {
        Some(path) => {
            log::debug!("loading telemetry config from [{path}]");
            TelemetryConfig::load(path)
        }
        None => Ok(TelemetryConfig::default()),
    }
}
