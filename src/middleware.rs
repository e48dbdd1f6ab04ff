//! The profiling middleware: request interception, guaranteed stop, and
//! the persistence cycle.
//!
//! One instance wraps one handler:
//!
//! ```rust,no_run
//! use stackware::{Config, Middleware, Request, Response};
//!
//! # async fn demo() -> Result<(), stackware::Error> {
//! let app = Middleware::new(
//!     |_req: Request| async { Response::text("hello") },
//!     Config::new().save_every(30),
//! );
//!
//! let response = app.call(Request::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # The active configuration
//!
//! Alongside the instance, construction installs its configuration as the
//! process-wide *active* one, fully replacing whatever was there before.
//! The administrative entry points — [`Middleware::save`],
//! [`Middleware::enabled`] and the accessors — read that shared state, so
//! out-of-band callers (an end-of-process flush, a debug endpoint) can act
//! without holding the instance. Single writer, at construction time only;
//! readers everywhere.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::PprofEngine;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::mode::Mode;
use crate::policy::Decision;
use crate::profiler::{Profiler, SampleOptions};
use crate::request::Request;
use crate::response::Response;

// ── Process-wide state ────────────────────────────────────────────────────────

/// The configuration installed by the most recent construction.
static ACTIVE: RwLock<Option<Arc<Shared>>> = RwLock::new(None);

/// Monotonic artifact ids, unique within the process.
static NEXT_DUMP_ID: AtomicU64 = AtomicU64::new(0);

/// Per-construction state: the resolved configuration, the engine, and the
/// throttle counter. Re-construction replaces the whole thing, counter
/// included — throttling state lives and dies with the configuration that
/// owns it.
struct Shared {
    config: Config,
    engine: Arc<dyn Profiler>,
    calls: AtomicU64,
}

fn active() -> Arc<Shared> {
    ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone)
        .expect("no active profiling configuration: construct stackware::Middleware first")
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Wraps a handler with a conditionally-enabled sampling profiler.
///
/// Per request: evaluate the enablement policy, maybe start the engine,
/// delegate, stop the engine on every exit path, run the persistence
/// cycle, hand the response back unchanged.
pub struct Middleware {
    next: BoxedHandler,
    shared: Arc<Shared>,
}

impl Middleware {
    /// Wraps `next` and installs `config` as the process-wide active
    /// configuration — a full replacement, no merging with a previous
    /// instance, and a fresh throttle counter.
    ///
    /// Nothing is validated here: a policy or saviour that misbehaves
    /// fails at the call site that invokes it, not at construction.
    pub fn new(next: impl Handler, config: Config) -> Self {
        let engine = config
            .engine
            .clone()
            .unwrap_or_else(|| Arc::new(PprofEngine::new()) as Arc<dyn Profiler>);
        let shared = Arc::new(Shared {
            config,
            engine,
            calls: AtomicU64::new(0),
        });
        *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&shared));
        Self {
            next: next.into_boxed_handler(),
            shared,
        }
    }

    /// The request interception cycle.
    ///
    /// Disabled requests are delegated untouched. Enabled ones run between
    /// an engine start and a stop that is guaranteed on every exit path —
    /// normal return, handler panic, and future cancellation alike — after
    /// which the persistence cycle runs. Persistence failures propagate to
    /// the caller; the request cycle aborts only after the profiler is
    /// safely stopped.
    pub async fn call(&self, req: Request) -> Result<Response, Error> {
        let decision = self.shared.config.enabled.evaluate(&req);
        let Decision::Enabled { mode } = decision else {
            return Ok(self.next.call(req).await);
        };

        let opts = SampleOptions {
            mode: mode.unwrap_or(self.shared.config.mode),
            interval: self.shared.config.interval,
            raw: self.shared.config.raw,
            metadata: self.shared.config.metadata.clone(),
        };
        debug!(mode = %opts.mode, interval = opts.interval, "profiling request");

        self.shared.engine.start(opts);
        let response = {
            // Start is the acquisition, stop the release: the guard's Drop
            // runs when the delegation returns, unwinds, or is cancelled.
            let _stop = StopGuard(self.shared.engine.as_ref());
            self.next.call(req.clone()).await
        };
        self.shared.save_cycle(&req)?;
        Ok(response)
    }
}

// ── Administrative entry points ───────────────────────────────────────────────

/// Static-style accessors against the active configuration.
///
/// # Panics
///
/// Every entry point here panics when no middleware was ever constructed.
/// That is a program invariant — wire the middleware before poking at it —
/// not a recoverable state.
impl Middleware {
    /// Output directory of the active configuration.
    pub fn path() -> PathBuf {
        active().config.path.clone()
    }

    /// Configured sampling mode.
    pub fn mode() -> Mode {
        active().config.mode
    }

    /// Configured sampling period, microseconds.
    pub fn interval() -> u64 {
        active().config.interval
    }

    /// Whether raw per-sample stacks are retained.
    pub fn raw() -> bool {
        active().config.raw
    }

    /// Evaluates the active enablement policy out-of-band. `None` runs it
    /// against the empty context — dynamic policies default on absence.
    pub fn enabled(req: Option<&Request>) -> Decision {
        let shared = active();
        match req {
            Some(req) => shared.config.enabled.evaluate(req),
            None => shared.config.enabled.evaluate(&Request::default()),
        }
    }

    /// Runs one persistence cycle against the active configuration —
    /// counter, throttle, saviour-or-dump — outside any request cycle.
    /// The usual customer is an end-of-process flush.
    pub fn save(req: Option<&Request>) -> Result<(), Error> {
        let shared = active();
        match req {
            Some(req) => shared.save_cycle(req),
            None => shared.save_cycle(&Request::default()),
        }
    }
}

// ── Persistence cycle ─────────────────────────────────────────────────────────

impl Shared {
    /// Count, throttle, then hand the results to the saviour or the
    /// default dump writer.
    fn save_cycle(&self, req: &Request) -> Result<(), Error> {
        let calls = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(every) = self.config.save_every {
            if calls % every.get() != 0 {
                debug!(calls, every = every.get(), "persistence throttled");
                return Ok(());
            }
        }

        let Some(profile) = self.engine.results() else {
            warn!("engine produced no results, nothing to persist");
            return Ok(());
        };

        if let Some(saviour) = &self.config.saviour {
            return saviour(req, &profile);
        }

        fs::create_dir_all(&self.config.path)?;
        let name = format!(
            "stackprof-{}-{}-{}.dump",
            profile.mode,
            process::id(),
            NEXT_DUMP_ID.fetch_add(1, Ordering::Relaxed),
        );
        let path = self.config.path.join(name);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, &profile)?;
        writer.flush()?;
        info!(path = %path.display(), "profile saved");
        Ok(())
    }
}

// ── Stop guard ────────────────────────────────────────────────────────────────

/// Pairs every engine start with exactly one stop.
///
/// Dropped when the delegation block exits — on a normal return, while a
/// handler panic unwinds, and when the request future is dropped mid-way.
struct StopGuard<'a>(&'a dyn Profiler);

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.0.stop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU64;
    use std::sync::{Mutex, MutexGuard};

    use super::*;
    use crate::profiler::Profile;

    /// The active configuration is process-wide; tests that install one
    /// take this lock so parallel test threads cannot interleave.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn noop(_req: Request) -> impl std::future::Future<Output = Response> + Send {
        async { Response::text("ok") }
    }

    fn profile(mode: Mode) -> Profile {
        Profile {
            mode,
            interval: 1000,
            raw: false,
            metadata: HashMap::new(),
            samples: Vec::new(),
        }
    }

    #[derive(Default)]
    struct MockEngine {
        started: Mutex<Vec<SampleOptions>>,
        stops: AtomicU64,
        results: Mutex<Option<Profile>>,
    }

    impl MockEngine {
        fn with_results(mode: Mode) -> Self {
            Self {
                results: Mutex::new(Some(profile(mode))),
                ..Self::default()
            }
        }
    }

    impl Profiler for MockEngine {
        fn start(&self, opts: SampleOptions) {
            self.started.lock().unwrap().push(opts);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn results(&self) -> Option<Profile> {
            self.results.lock().unwrap().clone()
        }
    }

    #[test]
    fn path_defaults_to_tmp() {
        let _guard = serial();
        let _mw = Middleware::new(noop, Config::new().engine(Arc::new(MockEngine::default())));
        assert_eq!(Middleware::path(), PathBuf::from("tmp"));
    }

    #[test]
    fn path_is_used_verbatim() {
        let _guard = serial();
        let _mw = Middleware::new(
            noop,
            Config::new()
                .path("/foo")
                .engine(Arc::new(MockEngine::default())),
        );
        assert_eq!(Middleware::path(), PathBuf::from("/foo"));
    }

    #[test]
    fn accessors_reflect_the_active_configuration() {
        let _guard = serial();
        let _mw = Middleware::new(
            noop,
            Config::new()
                .raw(true)
                .interval(500)
                .mode(Mode::Wall)
                .engine(Arc::new(MockEngine::default())),
        );
        assert!(Middleware::raw());
        assert_eq!(Middleware::interval(), 500);
        assert_eq!(Middleware::mode(), Mode::Wall);
    }

    #[test]
    fn enabled_reflects_static_and_dynamic_policies() {
        let _guard = serial();

        let _mw = Middleware::new(
            noop,
            Config::new()
                .enabled(false)
                .engine(Arc::new(MockEngine::default())),
        );
        assert_eq!(Middleware::enabled(None), Decision::Disabled);

        let _mw = Middleware::new(
            noop,
            Config::new()
                .enabled(true)
                .engine(Arc::new(MockEngine::default())),
        );
        assert_eq!(Middleware::enabled(None), Decision::enabled());

        let _mw = Middleware::new(
            noop,
            Config::new()
                .engine(Arc::new(MockEngine::default()))
                .enabled_when(|req| match req.header("x-profile") {
                    Some("wall") => Decision::with_mode(Mode::Wall),
                    Some(_) => Decision::enabled(),
                    None => Decision::Disabled,
                }),
        );
        let req = Request::get("/").with_header("x-profile", "wall");
        assert_eq!(
            Middleware::enabled(Some(&req)),
            Decision::Enabled { mode: Some(Mode::Wall) }
        );
        // the empty administrative context is the policy's case to default
        assert_eq!(Middleware::enabled(None), Decision::Disabled);
    }

    #[tokio::test]
    async fn disabled_config_delegates_untouched() {
        let _guard = serial();
        let engine = Arc::new(MockEngine::with_results(Mode::Cpu));
        let hits = Arc::new(AtomicU64::new(0));
        let handler = {
            let hits = Arc::clone(&hits);
            move |_req: Request| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Response::text("through")
                }
            }
        };

        let mw = Middleware::new(
            handler,
            Config::new().enabled(false).engine(Arc::clone(&engine) as Arc<dyn Profiler>),
        );
        let response = mw.call(Request::default()).await.unwrap();

        assert_eq!(response.body(), b"through");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(engine.started.lock().unwrap().is_empty());
        assert_eq!(engine.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn call_starts_with_the_policy_override_and_stops_once() {
        let _guard = serial();
        let engine = Arc::new(MockEngine::with_results(Mode::Wall));
        let hits = Arc::new(AtomicU64::new(0));
        let handler = {
            let hits = Arc::clone(&hits);
            move |_req: Request| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Response::text("profiled")
                }
            }
        };

        let mw = Middleware::new(
            handler,
            Config::new()
                .interval(2000)
                .raw(true)
                .engine(Arc::clone(&engine) as Arc<dyn Profiler>)
                .enabled_when(|_| Decision::with_mode(Mode::Wall))
                .saviour(|_, _| Ok(())),
        );
        let response = mw.call(Request::default()).await.unwrap();

        assert_eq!(response.body(), b"profiled");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let started = engine.started.lock().unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].mode, Mode::Wall);
        assert_eq!(started[0].interval, 2000);
        assert!(started[0].raw);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn profiler_stops_when_the_handler_panics() {
        let _guard = serial();
        let engine = Arc::new(MockEngine::with_results(Mode::Cpu));
        let saves = Arc::new(AtomicU64::new(0));
        let saviour_saves = Arc::clone(&saves);

        let mw = Middleware::new(
            |_req: Request| async {
                if true {
                    panic!("handler exploded");
                }
                Response::text("unreachable")
            },
            Config::new()
                .engine(Arc::clone(&engine) as Arc<dyn Profiler>)
                .saviour(move |_, _| {
                    saviour_saves.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        );

        let joined = tokio::spawn(async move { mw.call(Request::default()).await }).await;
        assert!(joined.is_err(), "the handler panic must surface");

        // the stop ran on the unwind path; the save cycle never did
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert_eq!(saves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn saviour_gets_the_request_and_results_and_owns_persistence() {
        let _guard = serial();
        let dir = tempfile::tempdir().unwrap();
        let never_created = dir.path().join("dumps");

        let engine = Arc::new(MockEngine::with_results(Mode::Wall));
        let seen: Arc<Mutex<Vec<(Option<String>, Mode)>>> = Arc::new(Mutex::new(Vec::new()));
        let saviour_seen = Arc::clone(&seen);

        let _mw = Middleware::new(
            noop,
            Config::new()
                .path(&never_created)
                .engine(Arc::clone(&engine) as Arc<dyn Profiler>)
                .saviour(move |req, profile| {
                    saviour_seen
                        .lock()
                        .unwrap()
                        .push((req.header("x-foo").map(str::to_owned), profile.mode));
                    Ok(())
                }),
        );

        let req = Request::get("/").with_header("x-foo", "bar");
        Middleware::save(Some(&req)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (Some("bar".to_owned()), Mode::Wall));
        // the default machinery stayed out of it
        assert!(!never_created.exists());
    }

    #[test]
    fn saviour_failures_propagate() {
        let _guard = serial();
        let engine = Arc::new(MockEngine::with_results(Mode::Cpu));
        let _mw = Middleware::new(
            noop,
            Config::new()
                .engine(Arc::clone(&engine) as Arc<dyn Profiler>)
                .saviour(|_, _| Err(Error::saviour("remote store rejected the profile"))),
        );

        let err = Middleware::save(None).unwrap_err();
        assert!(matches!(err, Error::Saviour(_)));
    }

    #[test]
    fn save_every_persists_every_nth_cycle_from_the_first() {
        let _guard = serial();
        let engine = Arc::new(MockEngine::with_results(Mode::Cpu));
        let saves = Arc::new(AtomicU64::new(0));
        let saviour_saves = Arc::clone(&saves);

        let _mw = Middleware::new(
            noop,
            Config::new()
                .save_every(3)
                .engine(Arc::clone(&engine) as Arc<dyn Profiler>)
                .saviour(move |_, _| {
                    saviour_saves.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        );

        let persisted: Vec<u64> = (1..=7)
            .map(|_| {
                Middleware::save(None).unwrap();
                saves.load(Ordering::SeqCst)
            })
            .collect();

        // cycles 3 and 6 persist, everything else is throttled
        assert_eq!(persisted, vec![0, 0, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn default_save_writes_a_dump_named_after_the_results_mode() {
        let _guard = serial();
        let dir = tempfile::tempdir().unwrap();
        // nested path proves recursive directory creation
        let out = dir.path().join("profiles").join("web");

        // results say wall even though the config says cpu — the filename
        // must follow the results
        let engine = Arc::new(MockEngine::with_results(Mode::Wall));
        let _mw = Middleware::new(
            noop,
            Config::new()
                .mode(Mode::Cpu)
                .path(&out)
                .engine(Arc::clone(&engine) as Arc<dyn Profiler>),
        );

        Middleware::save(None).unwrap();

        let names: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        let prefix = format!("stackprof-wall-{}-", process::id());
        assert!(names[0].starts_with(&prefix), "unexpected artifact name: {}", names[0]);
        assert!(names[0].ends_with(".dump"));

        let bytes = fs::read(out.join(&names[0])).unwrap();
        let decoded: Profile = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.mode, Mode::Wall);
    }

    #[test]
    fn save_without_results_is_a_quiet_no_op() {
        let _guard = serial();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty");

        let _mw = Middleware::new(
            noop,
            Config::new()
                .path(&out)
                .engine(Arc::new(MockEngine::default())),
        );

        Middleware::save(None).unwrap();
        assert!(!out.exists());
    }

    #[test]
    fn reconstruction_replaces_the_configuration_and_resets_the_counter() {
        let _guard = serial();
        let first_saves = Arc::new(AtomicU64::new(0));
        let second_saves = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&first_saves);
        let _first = Middleware::new(
            noop,
            Config::new()
                .path("/first")
                .save_every(2)
                .engine(Arc::new(MockEngine::with_results(Mode::Cpu)) as Arc<dyn Profiler>)
                .saviour(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        );
        assert_eq!(Middleware::path(), PathBuf::from("/first"));
        Middleware::save(None).unwrap(); // cycle 1 of the first counter — throttled

        let counter = Arc::clone(&second_saves);
        let _second = Middleware::new(
            noop,
            Config::new()
                .path("/second")
                .save_every(2)
                .engine(Arc::new(MockEngine::with_results(Mode::Cpu)) as Arc<dyn Profiler>)
                .saviour(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        );
        assert_eq!(Middleware::path(), PathBuf::from("/second"));

        Middleware::save(None).unwrap(); // cycle 1 of the fresh counter — throttled
        Middleware::save(None).unwrap(); // cycle 2 — persists

        assert_eq!(first_saves.load(Ordering::SeqCst), 0);
        assert_eq!(second_saves.load(Ordering::SeqCst), 1);
    }
}
