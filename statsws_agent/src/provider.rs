//! Source of raw cumulative counters. `SysinfoProvider` is the production
//! implementation; the sampler only sees the `MetricsProvider` trait.

use crate::error::ProviderError;
use crate::types::{CpuTimes, InterfaceCounters, MemoryCounters};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use sysinfo::{Networks, System};

/// Each call is independent so one failing section does not spoil the others.
/// Calls may block; the sampler runs them off the async workers.
pub trait MetricsProvider: Send + Sync + 'static {
    fn cpu_times(&self) -> Result<Vec<CpuTimes>, ProviderError>;
    fn memory(&self) -> Result<MemoryCounters, ProviderError>;
    fn interfaces(&self) -> Result<Vec<InterfaceCounters>, ProviderError>;
}

pub struct SysinfoProvider {
    sys: Mutex<System>,
    nets: Mutex<Networks>,
    // synthesized cumulative counters where /proc/stat is unavailable
    #[cfg(not(target_os = "linux"))]
    cpu_acc: Mutex<Vec<CpuTimes>>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut sys = System::new();
        // sysinfo needs a baseline refresh before per-core usage means anything
        #[cfg(not(target_os = "linux"))]
        sys.refresh_cpu_usage();
        Self {
            sys: Mutex::new(sys),
            nets: Mutex::new(Networks::new_with_refreshed_list()),
            #[cfg(not(target_os = "linux"))]
            cpu_acc: Mutex::new(Vec::new()),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SysinfoProvider {
    #[cfg(target_os = "linux")]
    fn cpu_times(&self) -> Result<Vec<CpuTimes>, ProviderError> {
        let s = std::fs::read_to_string("/proc/stat")?;
        parse_proc_stat(&s)
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu_times(&self) -> Result<Vec<CpuTimes>, ProviderError> {
        let usage: Vec<f32> = {
            let mut sys = lock(&self.sys)?;
            guarded(|| sys.refresh_cpu_usage())?;
            sys.cpus().iter().map(|c| c.cpu_usage()).collect()
        };
        if usage.is_empty() {
            return Err(ProviderError::Unsupported);
        }
        // One "tick" of 100 units per call, busy share taken from sysinfo's usage,
        // so the derived percentage equals sysinfo's usage for the interval.
        let mut acc = lock(&self.cpu_acc)?;
        acc.resize(usage.len(), CpuTimes::default());
        for (c, u) in acc.iter_mut().zip(&usage) {
            c.all += 100.0;
            c.busy += f64::from(u.clamp(0.0, 100.0));
        }
        Ok(acc.clone())
    }

    fn memory(&self) -> Result<MemoryCounters, ProviderError> {
        let mut sys = lock(&self.sys)?;
        guarded(|| sys.refresh_memory())?;
        Ok(MemoryCounters {
            available: sys.available_memory(),
            total: sys.total_memory(),
            used: sys.used_memory(),
        })
    }

    fn interfaces(&self) -> Result<Vec<InterfaceCounters>, ProviderError> {
        let mut nets = lock(&self.nets)?;
        guarded(|| nets.refresh(true))?;
        Ok(nets
            .iter()
            .map(|(name, data)| {
                let mac = data.mac_address();
                InterfaceCounters {
                    name: name.clone(),
                    mac: if mac.is_unspecified() {
                        String::new()
                    } else {
                        mac.to_string()
                    },
                    bytes_received_total: data.total_received(),
                    bytes_sent_total: data.total_transmitted(),
                }
            })
            .collect())
    }
}

/// Parse the per-core `cpuN` lines of `/proc/stat`. The aggregate `cpu` line is skipped.
///
/// busy = user + nice + system + iowait + irq + softirq + steal; all = busy + idle.
/// guest time is already folded into user by the kernel.
pub fn parse_proc_stat(s: &str) -> Result<Vec<CpuTimes>, ProviderError> {
    let mut cores = Vec::new();
    for line in s.lines() {
        let mut it = line.split_whitespace();
        let Some(label) = it.next() else { continue };
        let Some(idx) = label.strip_prefix("cpu") else {
            continue;
        };
        if idx.is_empty() || !idx.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let fields = it
            .take(8)
            .map(|tok| {
                tok.parse::<u64>()
                    .map_err(|_| ProviderError::Parse(format!("{label}: bad field {tok:?}")))
            })
            .collect::<Result<Vec<u64>, _>>()?;
        if fields.len() < 4 {
            return Err(ProviderError::Parse(format!(
                "{label}: expected at least 4 fields, got {}",
                fields.len()
            )));
        }
        let field = |i: usize| fields.get(i).copied().unwrap_or(0);
        let idle = field(3);
        let busy = field(0) + field(1) + field(2) + field(4) + field(5) + field(6) + field(7);
        cores.push(CpuTimes {
            all: (busy + idle) as f64,
            busy: busy as f64,
        });
    }
    if cores.is_empty() {
        return Err(ProviderError::Parse("no per-core cpu lines".into()));
    }
    Ok(cores)
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, ProviderError> {
    m.lock()
        .map_err(|_| ProviderError::Panicked("provider lock poisoned".into()))
}

fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, ProviderError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|e| ProviderError::Panicked(panic_message(&*e)))
}

fn panic_message(e: &(dyn Any + Send)) -> String {
    if let Some(s) = e.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = e.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
