use log::debug;
use sysinfo::{ProcessExt, System, SystemExt};

/// Resident memory of this process in bytes, or 0 when it cannot be read.
pub fn monitor_memory() -> u64 {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(err) => {
            debug!("cannot resolve own pid: {err}");
            return 0;
        }
    };
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return 0;
    }
    sys.process(pid).map(|p| p.memory()).unwrap_or(0)
}

/// `monitor_memory` in mebibytes, for log lines.
pub fn memory_mib() -> f64 {
    monitor_memory() as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_uses_some_memory() {
        if cfg!(target_os = "linux") {
            assert!(monitor_memory() > 0);
        }
    }
}
