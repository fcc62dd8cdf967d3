//! Java Flight Recorder: adds JVM flags that record a flight recording per node.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::TelemetryParams;
use crate::device::{Device, DeviceInfo, EnvironmentContributor, LaunchTarget};
use crate::error::Result;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "jfr",
    human_name: "Flight Recorder",
    help: "Enables Java Flight Recorder (requires an Oracle JDK or OpenJDK 11+)",
    internal: false,
};

pub struct FlightRecorder {
    log_root: PathBuf,
    java_major_version: u32,
    recording_template: Option<String>,
}

impl FlightRecorder {
    pub fn new(
        params: &TelemetryParams,
        log_root: impl Into<PathBuf>,
        java_major_version: u32,
    ) -> Result<Self> {
        Ok(Self {
            log_root: log_root.into(),
            java_major_version,
            recording_template: params.str("recording-template")?.map(str::to_string),
        })
    }

    /// JVM flags writing a recording to `recording`.
    pub fn java_opts(&self, recording: &Path) -> String {
        let recording = recording.display();
        let mut opts = String::from(
            "-XX:+UnlockDiagnosticVMOptions -XX:+UnlockCommercialFeatures -XX:+DebugNonSafepoints",
        );
        if self.java_major_version < 9 {
            opts.push_str(&format!(
                " -XX:+FlightRecorder -XX:FlightRecorderOptions=disk=true,maxage=0s,maxsize=0,dumponexit=true,\
                 dumponexitpath={recording} -XX:StartFlightRecording=defaultrecording=true"
            ));
        } else {
            opts.push_str(&format!(
                " -XX:StartFlightRecording=maxsize=0,maxage=0s,disk=true,dumponexit=true,filename={recording}"
            ));
        }
        if let Some(template) = &self.recording_template {
            opts.push_str(&format!(",settings={template}"));
        }
        opts
    }
}

impl EnvironmentContributor for FlightRecorder {
    fn instrument_env(
        &self,
        _target: &LaunchTarget,
        node_name: &str,
    ) -> Result<BTreeMap<String, String>> {
        std::fs::create_dir_all(&self.log_root)?;
        let recording = self.log_root.join(format!("{node_name}.jfr"));
        info!(
            "{}: writing flight recording to [{}]",
            INFO.human_name,
            recording.display()
        );
        Ok(BTreeMap::from([(
            "ES_JAVA_OPTS".to_string(),
            self.java_opts(&recording),
        )]))
    }
}

impl Device for FlightRecorder {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_env_contributor(&self) -> Option<&dyn EnvironmentContributor> {
        Some(self)
    }
}
