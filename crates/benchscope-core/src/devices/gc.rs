//! GC logging: adds JVM flags that write a GC log per node.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::info;

use crate::device::{Device, DeviceInfo, EnvironmentContributor, LaunchTarget};
use crate::error::Result;

pub const INFO: DeviceInfo = DeviceInfo {
    command: "gc",
    human_name: "GC log",
    help: "Enables GC logs.",
    internal: false,
};

pub struct Gc {
    log_root: PathBuf,
    java_major_version: u32,
}

impl Gc {
    pub fn new(log_root: impl Into<PathBuf>, java_major_version: u32) -> Self {
        Self {
            log_root: log_root.into(),
            java_major_version,
        }
    }

    pub fn java_opts(&self, log_file: &Path) -> String {
        let log_file = log_file.display();
        if self.java_major_version < 9 {
            format!(
                "-Xloggc:{log_file} -XX:+PrintGCDetails -XX:+PrintGCDateStamps -XX:+PrintGCTimeStamps \
                 -XX:+PrintGCApplicationStoppedTime -XX:+PrintGCApplicationConcurrentTime -XX:+PrintTenuringDistribution"
            )
        } else {
            // Unified JVM logging (JEP 158).
            format!(
                "-Xlog:gc*=info,safepoint=info,age*=trace:file={log_file}:utctime,uptimemillis,level,tags:filecount=0"
            )
        }
    }
}

impl EnvironmentContributor for Gc {
    fn instrument_env(
        &self,
        _target: &LaunchTarget,
        node_name: &str,
    ) -> Result<BTreeMap<String, String>> {
        std::fs::create_dir_all(&self.log_root)?;
        let log_file = self.log_root.join(format!("{node_name}.gc.log"));
        info!("{}: writing GC log to [{}]", INFO.human_name, log_file.display());
        Ok(BTreeMap::from([(
            "ES_JAVA_OPTS".to_string(),
            self.java_opts(&log_file),
        )]))
    }
}

impl Device for Gc {
    fn info(&self) -> &DeviceInfo {
        &INFO
    }

    fn as_env_contributor(&self) -> Option<&dyn EnvironmentContributor> {
        Some(self)
    }
}
