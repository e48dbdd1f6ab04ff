//! Middleware configuration.
//!
//! Everything here is resolved once at construction time. The two policies
//! — enablement and persistence — are the only pieces consulted again per
//! request; both live in the configuration as callables.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Error;
use crate::mode::Mode;
use crate::policy::{Decision, Enablement};
use crate::profiler::{Profile, Profiler};
use crate::request::Request;

/// Library-wide default sampling period: 1000 µs, one sample a millisecond.
pub const DEFAULT_INTERVAL: u64 = 1000;

/// Default output directory for profile dumps.
pub const DEFAULT_PATH: &str = "tmp";

/// A custom persistence callable: receives the request context and the
/// collected profile, and decides for itself what storage means. When one
/// is configured the default path/naming machinery is bypassed entirely.
pub type Saviour = Arc<dyn Fn(&Request, &Profile) -> Result<(), Error> + Send + Sync>;

/// Options for [`Middleware::new`](crate::Middleware::new).
///
/// Nothing is validated at construction: a policy or saviour that
/// misbehaves fails at the call site that invokes it.
///
/// ```rust
/// use stackware::{Config, Decision, Mode};
///
/// let config = Config::new()
///     .path("/var/profiles")
///     .interval(500)
///     .raw(true)
///     .save_every(30)
///     .enabled_when(|req| Decision::from(req.header("x-profile").is_some()));
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) mode: Mode,
    pub(crate) interval: u64,
    pub(crate) raw: bool,
    pub(crate) path: PathBuf,
    pub(crate) enabled: Enablement,
    pub(crate) saviour: Option<Saviour>,
    pub(crate) save_every: Option<NonZeroU64>,
    pub(crate) metadata: HashMap<String, String>,
    pub(crate) engine: Option<Arc<dyn Profiler>>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            mode: Mode::Cpu,
            interval: DEFAULT_INTERVAL,
            raw: false,
            path: PathBuf::from(DEFAULT_PATH),
            enabled: Enablement::default(),
            saviour: None,
            save_every: None,
            metadata: HashMap::new(),
            engine: None,
        }
    }

    /// Sampling strategy used when the enablement policy does not override
    /// it per request. Defaults to [`Mode::Cpu`].
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sampling period in microseconds. Defaults to [`DEFAULT_INTERVAL`].
    pub fn interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Retain raw per-sample call stacks. Defaults to `false`.
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Directory the dump files land in, used verbatim — no expansion, no
    /// normalization. Created on first save. Defaults to [`DEFAULT_PATH`].
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Statically enable or disable profiling for every request.
    /// Defaults to enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Enablement::Static(enabled);
        self
    }

    /// Decide per request. The closure may return a [`Decision`] — which
    /// can carry a per-request mode override — or a plain `bool`.
    pub fn enabled_when<F, D>(mut self, policy: F) -> Self
    where
        F: Fn(&Request) -> D + Send + Sync + 'static,
        D: Into<Decision>,
    {
        self.enabled = Enablement::when(policy);
        self
    }

    /// Replace the built-in persistence entirely. The saviour is invoked
    /// with the request context and the collected profile; no directory is
    /// created and no dump file is opened on its behalf.
    pub fn saviour<F>(mut self, saviour: F) -> Self
    where
        F: Fn(&Request, &Profile) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.saviour = Some(Arc::new(saviour));
        self
    }

    /// Persist only every `n`th completed stop cycle, counted from the
    /// first. Zero is treated as unset — persist every time.
    pub fn save_every(mut self, n: u64) -> Self {
        self.save_every = NonZeroU64::new(n);
        self
    }

    /// Record a key/value into every collected profile.
    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Swap the sampling engine. Defaults to
    /// [`PprofEngine`](crate::PprofEngine).
    pub fn engine(mut self, engine: Arc<dyn Profiler>) -> Self {
        self.engine = Some(engine);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
