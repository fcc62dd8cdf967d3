use std::sync::Arc;

use benchscope_core::{
    DeviceContext, LaunchTarget, NopSink, Result, TelemetryDispatcher, build_devices,
};

/// Print the environment variables the enabled devices contribute to `node`.
pub fn run(config_path: Option<&str>, node: &str, target: &str) -> Result<()> {
    let config = super::load_config(config_path)?;
    let ctx = DeviceContext::connect(config.clone(), Arc::new(NopSink))?;
    let telemetry = TelemetryDispatcher::new(&config.devices, build_devices(&ctx)?);

    let env = telemetry.instrument_candidate_env(&LaunchTarget::new(target), node)?;
    if env.is_empty() {
        println!("No device contributes to the environment of [{node}].");
        return Ok(());
    }
    for (key, value) in &env {
        println!("{key}={value}");
    }
    Ok(())
}
