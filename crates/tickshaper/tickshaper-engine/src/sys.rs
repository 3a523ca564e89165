//! Process resource sampling and CPU pinning via libc.

use std::time::Instant;

/// Samples process CPU time and resident set size through `getrusage`,
/// deriving a utilization percentage from consecutive samples.
pub struct ResourceSampler {
    last_wall: Instant,
    last_cpu_us: Option<u64>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            last_wall: Instant::now(),
            last_cpu_us: None,
        }
    }

    /// Returns `(cpu_percent, rss_bytes)`. The first call establishes a
    /// baseline and reports 0% CPU.
    pub fn sample(&mut self) -> Option<(f64, u64)> {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        // SAFETY: getrusage fills the struct for RUSAGE_SELF.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        // SAFETY: rc == 0 means the struct was initialized.
        let usage = unsafe { usage.assume_init() };

        let cpu_us = timeval_us(usage.ru_utime) + timeval_us(usage.ru_stime);
        let wall_us = self.last_wall.elapsed().as_micros() as u64;

        let cpu_percent = match self.last_cpu_us {
            Some(last) if wall_us > 0 => {
                let spent = cpu_us.saturating_sub(last) as f64;
                (spent * 100.0 / wall_us as f64).min(100.0)
            }
            _ => 0.0,
        };

        self.last_cpu_us = Some(cpu_us);
        self.last_wall = Instant::now();

        Some((cpu_percent, rss_bytes(usage.ru_maxrss)))
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn timeval_us(tv: libc::timeval) -> u64 {
    tv.tv_sec as u64 * 1_000_000 + tv.tv_usec as u64
}

/// `ru_maxrss` is kilobytes on Linux, bytes on macOS.
#[cfg(target_os = "macos")]
fn rss_bytes(maxrss: libc::c_long) -> u64 {
    maxrss as u64
}

#[cfg(not(target_os = "macos"))]
fn rss_bytes(maxrss: libc::c_long) -> u64 {
    maxrss as u64 * 1024
}

/// Pins the calling thread to CPU `worker % hardware_concurrency`.
/// Returns the CPU chosen, or `None` when pinning is unavailable.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(worker: usize) -> Option<usize> {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).ok()?;
    let target = worker % cpus;

    // SAFETY: plain cpu_set_t manipulation followed by a syscall on the
    // current thread (pid 0).
    unsafe {
        let mut set = std::mem::zeroed::<libc::cpu_set_t>();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(target, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0 {
            Some(target)
        } else {
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_worker: usize) -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_reports_plausible_values() {
        let mut sampler = ResourceSampler::new();
        let (cpu, rss) = sampler.sample().expect("getrusage works");
        assert_eq!(cpu, 0.0, "first sample is the baseline");
        assert!(rss > 0, "a running process has resident memory");

        // Burn a little CPU so the second sample has something to report.
        let mut x = 0u64;
        for i in 0..2_000_000u64 {
            x = x.wrapping_add(i);
        }
        std::hint::black_box(x);

        let (cpu, _) = sampler.sample().unwrap();
        assert!((0.0..=100.0).contains(&cpu));
    }
}
