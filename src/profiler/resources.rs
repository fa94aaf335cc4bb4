//! Process resource sampling.
//!
//! Snapshots are taken inline on the call path (every Nth call event), so
//! they must be fast and must never fail: every field degrades to zero or
//! empty when acquisition is impossible or the feature is disabled.

use crate::profiler::stats::ResourceSnapshot;
use log::{debug, warn};
use sysinfo::{Pid, ProcessRefreshKind, System};

#[cfg(feature = "gpu")]
use nvml_wrapper::Nvml;

/// Best-effort CPU/memory/GPU monitor for the host process
///
/// **Public** - owned by the profiler. Availability is probed once at
/// construction; a failed probe disables that feature for the monitor's
/// lifetime, with no retry.
pub struct ResourceMonitor {
    process: Option<Pid>,
    system: System,

    #[cfg(feature = "gpu")]
    nvml: Option<Nvml>,

    gpu_available: bool,
}

impl ResourceMonitor {
    pub fn new(enable_cpu: bool, enable_gpu: bool) -> Self {
        let process = if enable_cpu {
            match sysinfo::get_current_pid() {
                Ok(pid) => Some(pid),
                Err(e) => {
                    warn!("CPU monitoring disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        #[cfg(feature = "gpu")]
        let (nvml, gpu_available) = if enable_gpu {
            match Nvml::init() {
                Ok(nvml) => {
                    let count = nvml.device_count().unwrap_or(0);
                    debug!("NVML initialized, {count} device(s)");
                    (Some(nvml), count > 0)
                }
                Err(e) => {
                    warn!("GPU monitoring disabled: {e}");
                    (None, false)
                }
            }
        } else {
            (None, false)
        };

        #[cfg(not(feature = "gpu"))]
        let gpu_available = {
            if enable_gpu {
                debug!("GPU monitoring requested but the gpu feature is not compiled in");
            }
            false
        };

        Self {
            process,
            system: System::new(),
            #[cfg(feature = "gpu")]
            nvml,
            gpu_available,
        }
    }

    /// Whether an accelerator was detected at construction
    pub fn gpu_available(&self) -> bool {
        self.gpu_available
    }

    /// Capture current resource usage
    ///
    /// **Public** - infallible; runs inline on the hot call path
    pub fn snapshot(&mut self) -> ResourceSnapshot {
        let mut snapshot = ResourceSnapshot::default();

        if let Some(pid) = self.process {
            self.system.refresh_process_specifics(
                pid,
                ProcessRefreshKind::new().with_cpu().with_memory(),
            );
            if let Some(process) = self.system.process(pid) {
                snapshot.cpu_percent = f64::from(process.cpu_usage());
                snapshot.memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
            }
        }

        #[cfg(feature = "gpu")]
        if self.gpu_available {
            if let Some(nvml) = &self.nvml {
                let count = nvml.device_count().unwrap_or(0);
                for index in 0..count {
                    let Ok(device) = nvml.device_by_index(index) else {
                        continue;
                    };
                    if let Ok(rates) = device.utilization_rates() {
                        snapshot.gpu_utilization.push(f64::from(rates.gpu));
                    }
                    if let Ok(memory) = device.memory_info() {
                        snapshot
                            .gpu_memory_mb
                            .push(memory.used as f64 / (1024.0 * 1024.0));
                    }
                }
            }
        }

        snapshot
    }
}
