//! Host facts for nodes provisioned on the local machine (best-effort).

/// Operating system and CPU facts of the host a node runs on.
pub trait SystemProbe: Send + Sync {
    fn os_name(&self) -> Option<String>;
    fn os_version(&self) -> Option<String>;
    fn logical_cpu_cores(&self) -> Option<u64>;
    fn physical_cpu_cores(&self) -> Option<u64>;
    fn cpu_model(&self) -> Option<String>;
}

/// Probes the machine the process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSystem;

impl SystemProbe for LocalSystem {
    fn os_name(&self) -> Option<String> {
        uname().map(|u| u.sysname)
    }

    fn os_version(&self) -> Option<String> {
        uname().map(|u| u.release)
    }

    fn logical_cpu_cores(&self) -> Option<u64> {
        std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u64)
    }

    fn physical_cpu_cores(&self) -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
            physical_cores_from_cpuinfo(&cpuinfo)
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    fn cpu_model(&self) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
            cpu_model_from_cpuinfo(&cpuinfo)
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

/// Fixed answers, for tests and hosts that cannot be probed.
#[derive(Debug, Default, Clone)]
pub struct StaticSystem {
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub logical_cpu_cores: Option<u64>,
    pub physical_cpu_cores: Option<u64>,
    pub cpu_model: Option<String>,
}

impl SystemProbe for StaticSystem {
    fn os_name(&self) -> Option<String> {
        self.os_name.clone()
    }
    fn os_version(&self) -> Option<String> {
        self.os_version.clone()
    }
    fn logical_cpu_cores(&self) -> Option<u64> {
        self.logical_cpu_cores
    }
    fn physical_cpu_cores(&self) -> Option<u64> {
        self.physical_cpu_cores
    }
    fn cpu_model(&self) -> Option<String> {
        self.cpu_model.clone()
    }
}

struct Uname {
    sysname: String,
    release: String,
}

fn uname() -> Option<Uname> {
    #[cfg(unix)]
    {
        // SAFETY: `utsname` is plain old data; `uname` fills it in on success.
        let mut buf: libc::utsname = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::uname(&mut buf) };
        if rc != 0 {
            return None;
        }
        Some(Uname {
            sysname: c_chars_to_string(&buf.sysname),
            release: c_chars_to_string(&buf.release),
        })
    }
    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(unix)]
fn c_chars_to_string(chars: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Distinct `(physical id, core id)` pairs.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn physical_cores_from_cpuinfo(cpuinfo: &str) -> Option<u64> {
    let mut cores = std::collections::BTreeSet::new();
    let mut physical_id = None;
    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "physical id" => physical_id = Some(value.trim().to_string()),
            "core id" => {
                cores.insert((physical_id.clone(), value.trim().to_string()));
            }
            _ => {}
        }
    }
    (!cores.is_empty()).then_some(cores.len() as u64)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn cpu_model_from_cpuinfo(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim() == "model name")
        .map(|(_, v)| v.trim().to_string())
}
