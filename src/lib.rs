//! # stackware
//!
//! Request-scoped sampling-profiler middleware. Wrap a handler, decide per
//! request whether it gets profiled, and keep the dumps you actually want.
//! Nothing more. Nothing less.
//!
//! ## The contract
//!
//! The profiler engine samples, the host framework dispatches, the
//! filesystem stores. stackware does none of those — by design. What it
//! owns is the only part that changes between deployments:
//!
//! - **Enablement** — which requests get profiled, decided statically or
//!   by a per-request policy that may also override the sampling mode
//! - **Lifecycle** — an engine start paired with a stop that runs on every
//!   exit path, handler panics and cancelled futures included
//! - **Persistence** — throttled dump writing under a stable naming
//!   convention (`stackprof-<mode>-<pid>-<id>.dump`), or a custom saviour
//!   that replaces the built-in storage entirely
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use stackware::{Config, Decision, Middleware, Mode, Request, Response};
//!
//! # async fn demo() -> Result<(), stackware::Error> {
//! let app = Middleware::new(
//!     |_req: Request| async { Response::text("hello") },
//!     Config::new()
//!         .path("/var/profiles")
//!         .save_every(30)
//!         .enabled_when(|req| match req.header("x-profile") {
//!             Some("wall") => Decision::with_mode(Mode::Wall),
//!             Some(_)      => Decision::enabled(),
//!             None         => Decision::Disabled,
//!         }),
//! );
//!
//! let response = app.call(Request::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Construction also installs the configuration as the process-wide active
//! one, so administrative callers can flush or inspect out-of-band:
//!
//! ```rust,no_run
//! use stackware::Middleware;
//!
//! // end-of-process flush, no request in sight
//! Middleware::save(None).expect("final profile flush failed");
//! ```

mod config;
mod engine;
mod error;
mod handler;
mod middleware;
mod mode;
mod policy;
mod profiler;
mod request;
mod response;

pub use config::{Config, DEFAULT_INTERVAL, DEFAULT_PATH, Saviour};
pub use engine::PprofEngine;
pub use error::Error;
pub use handler::Handler;
pub use middleware::Middleware;
pub use mode::Mode;
pub use policy::{Decision, Enablement, Predicate};
pub use profiler::{Profile, Profiler, Sample, SampleOptions};
pub use request::Request;
pub use response::{IntoResponse, Response};
