use crate::domain::ports::SampleSource;
use sysinfo::{Pid, System};
use tracing::debug;

/// Host and process readings from `sysinfo`.
///
/// CPU utilisation is measured between two refreshes, so the first sample
/// after construction reports zero for every CPU.
pub struct SystemSampler {
    sys: System,
    pid: Option<Pid>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        let pid = sysinfo::get_current_pid().ok();
        Self { sys, pid }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SystemSampler {
    fn sample(&mut self) -> Vec<(String, f64)> {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        let mut readings = vec![
            ("TotalMemory".to_string(), self.sys.total_memory() as f64),
            ("FreeMemory".to_string(), self.sys.free_memory() as f64),
            ("UsedMemory".to_string(), self.sys.used_memory() as f64),
            ("AvailableMemory".to_string(), self.sys.available_memory() as f64),
            ("TotalSwap".to_string(), self.sys.total_swap() as f64),
            ("UsedSwap".to_string(), self.sys.used_swap() as f64),
            (
                "CPUutilization".to_string(),
                f64::from(self.sys.global_cpu_info().cpu_usage()),
            ),
            ("LoadAverage1".to_string(), System::load_average().one),
        ];

        for (i, cpu) in self.sys.cpus().iter().enumerate() {
            readings.push((format!("CPUutilization{}", i + 1), f64::from(cpu.cpu_usage())));
        }

        if let Some(pid) = self.pid
            && self.sys.refresh_process(pid)
            && let Some(process) = self.sys.process(pid)
        {
            readings.push(("ProcessResidentMemory".to_string(), process.memory() as f64));
            readings.push(("ProcessVirtualMemory".to_string(), process.virtual_memory() as f64));
        }

        debug!("SystemSampler: {} readings", readings.len());
        readings
    }
}
