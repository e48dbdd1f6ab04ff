//! The profiler-engine seam.
//!
//! stackware does not sample anything itself. It drives an engine through
//! three primitives — start, stop, results — and stays deliberately
//! ignorant of what happens in between. [`PprofEngine`](crate::PprofEngine)
//! is the bundled implementation; hosts with their own collector implement
//! [`Profiler`] and hand it to [`Config::engine`](crate::Config::engine).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// Parameters handed to [`Profiler::start`] for one request cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SampleOptions {
    /// Sampling strategy: the configured mode, unless the enablement policy
    /// overrode it for this request.
    pub mode: Mode,
    /// Sampling period in microseconds.
    pub interval: u64,
    /// Retain raw per-sample call stacks instead of leaf aggregates.
    pub raw: bool,
    /// Free-form key/values to record into the resulting profile.
    pub metadata: HashMap<String, String>,
}

/// A sampling engine driven by the middleware.
///
/// One engine instance is a single global resource. The middleware never
/// interleaves start/stop pairs itself, but overlapping in-process requests
/// will — a documented limitation of request-scoped profiling, out of both
/// sides' control.
pub trait Profiler: Send + Sync {
    /// Begins sampling. No return value is relied upon: an engine that
    /// cannot start should log and swallow, not fail the request.
    fn start(&self, opts: SampleOptions);

    /// Ends sampling. The middleware guarantees one stop per start, on
    /// every exit path.
    fn stop(&self);

    /// Snapshot of the most recently completed run, if there is one.
    fn results(&self) -> Option<Profile>;
}

/// A completed profile, as handed over by the engine.
///
/// The middleware reads exactly one field — `mode`, for artifact naming —
/// and serializes the rest verbatim. The sample rows belong to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    /// The mode the run was sampled in. Artifact names carry this value,
    /// not the statically configured one, so per-request overrides show up
    /// in the filename.
    pub mode: Mode,
    /// Sampling period of the run, microseconds.
    pub interval: u64,
    /// Whether raw call stacks were retained.
    pub raw: bool,
    /// Key/values carried over from the configuration.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Aggregated call-stack rows.
    pub samples: Vec<Sample>,
}

/// One aggregated call-stack row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sample {
    /// Thread the stack was captured on.
    pub thread: String,
    /// Symbolized frames, leaf first.
    pub frames: Vec<String>,
    /// How many times this stack was seen.
    pub count: u64,
}
