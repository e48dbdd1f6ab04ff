//! The bundled sampling engine, backed by `pprof`.

use std::sync::{Mutex, PoisonError};

use pprof::{ProfilerGuard, ProfilerGuardBuilder};
use tracing::{debug, warn};

use crate::mode::Mode;
use crate::profiler::{Profile, Profiler, Sample, SampleOptions};

/// Frames that are sampler plumbing, not application code.
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

/// A [`Profiler`] over `pprof`'s signal-based CPU sampler.
///
/// Only [`Mode::Cpu`] is sampled natively. Wall and object requests are
/// logged as unsupported and sampled as CPU rather than failing the request
/// cycle — the collected profile reports [`Mode::Cpu`], because that is
/// what its samples actually are. Hosts that need real wall-clock or
/// allocation engines implement [`Profiler`] themselves.
pub struct PprofEngine {
    running: Mutex<Option<(ProfilerGuard<'static>, SampleOptions)>>,
    last: Mutex<Option<Profile>>,
}

impl PprofEngine {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(None),
            last: Mutex::new(None),
        }
    }
}

impl Default for PprofEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler for PprofEngine {
    fn start(&self, opts: SampleOptions) {
        let mut slot = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("cpu sampler already running, ignoring start");
            return;
        }
        if opts.mode != Mode::Cpu {
            warn!(requested = %opts.mode, "mode not supported by the pprof engine, sampling cpu");
        }

        // The configured interval is a period in µs; pprof wants Hz.
        let frequency = (1_000_000 / opts.interval.max(1)).max(1) as i32;
        match ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(BLOCKLIST)
            .build()
        {
            Ok(guard) => {
                debug!(frequency, "cpu sampler started");
                *slot = Some((guard, opts));
            }
            Err(e) => warn!("cpu sampler failed to start: {e}"),
        }
    }

    fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((guard, opts)) = taken else { return };

        let report = match guard.report().build() {
            Ok(report) => report,
            Err(e) => {
                warn!("cpu sampler report failed: {e}");
                return;
            }
        };

        let samples = report
            .data
            .iter()
            .map(|(frames, count)| {
                let mut symbols: Vec<String> = frames
                    .frames
                    .iter()
                    .flatten()
                    .map(|symbol| symbol.name())
                    .collect();
                if !opts.raw {
                    // Leaf aggregate only; the full stack is raw-mode data.
                    symbols.truncate(1);
                }
                Sample {
                    thread: frames.thread_name.clone(),
                    frames: symbols,
                    count: (*count).max(0) as u64,
                }
            })
            .collect();

        let profile = Profile {
            mode: Mode::Cpu,
            interval: opts.interval,
            raw: opts.raw,
            metadata: opts.metadata,
            samples,
        };
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(profile);
    }

    fn results(&self) -> Option<Profile> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
