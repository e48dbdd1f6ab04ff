//! Enablement policy: which requests get profiled, and in which mode.
//!
//! The per-request outcome is the tagged [`Decision`] type. There is no
//! boolean-or-tuple guessing at the call site — a policy either says
//! [`Decision::Disabled`], or says [`Decision::Enabled`] and may carry a
//! per-request mode override inside the variant.

use std::fmt;
use std::sync::Arc;

use crate::mode::Mode;
use crate::request::Request;

// ── Decision ──────────────────────────────────────────────────────────────────

/// The outcome of an enablement policy for one request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Skip profiling; delegate straight to the wrapped handler.
    Disabled,
    /// Profile this request. `mode` overrides the configured sampling mode
    /// for this request only; `None` keeps the configured one.
    Enabled { mode: Option<Mode> },
}

impl Decision {
    /// Profile with the configured mode.
    pub fn enabled() -> Self {
        Self::Enabled { mode: None }
    }

    /// Profile with a per-request mode override.
    pub fn with_mode(mode: Mode) -> Self {
        Self::Enabled { mode: Some(mode) }
    }

    /// True unless the decision is [`Decision::Disabled`].
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled { .. })
    }

    /// The per-request mode override, if any.
    pub fn mode_override(self) -> Option<Mode> {
        match self {
            Self::Enabled { mode } => mode,
            Self::Disabled => None,
        }
    }
}

/// Lets plain-boolean policies participate: `true` enables with the
/// configured mode, `false` disables.
impl From<bool> for Decision {
    fn from(enabled: bool) -> Self {
        if enabled { Self::enabled() } else { Self::Disabled }
    }
}

// ── Enablement ────────────────────────────────────────────────────────────────

/// A per-request policy callable: request context in, [`Decision`] out.
pub type Predicate = Arc<dyn Fn(&Request) -> Decision + Send + Sync>;

/// How enablement is decided: fixed at construction time, or per request.
#[derive(Clone)]
pub enum Enablement {
    /// The same answer for every request, regardless of its content.
    Static(bool),
    /// Ask the policy callable, request by request.
    Dynamic(Predicate),
}

impl Enablement {
    /// Wraps a closure returning anything convertible into a [`Decision`]
    /// — a `Decision` itself, or a plain `bool`.
    ///
    /// ```rust
    /// use stackware::{Decision, Enablement, Mode};
    ///
    /// // boolean policy
    /// Enablement::when(|req| req.header("x-profile").is_some());
    ///
    /// // policy with a mode override
    /// Enablement::when(|req| match req.header("x-profile") {
    ///     Some("wall") => Decision::with_mode(Mode::Wall),
    ///     Some(_)      => Decision::enabled(),
    ///     None         => Decision::Disabled,
    /// });
    /// ```
    pub fn when<F, D>(policy: F) -> Self
    where
        F: Fn(&Request) -> D + Send + Sync + 'static,
        D: Into<Decision>,
    {
        Self::Dynamic(Arc::new(move |req| policy(req).into()))
    }

    /// Evaluates the policy for one request context.
    ///
    /// An empty context (see [`Request::default`]) is a legal input: keys a
    /// dynamic policy expects may simply be absent, and defaulting on
    /// absence is the policy's own responsibility.
    pub fn evaluate(&self, req: &Request) -> Decision {
        match self {
            Self::Static(enabled) => Decision::from(*enabled),
            Self::Dynamic(policy) => policy(req),
        }
    }
}

/// Enabled for every request.
impl Default for Enablement {
    fn default() -> Self {
        Self::Static(true)
    }
}

impl From<bool> for Enablement {
    fn from(enabled: bool) -> Self {
        Self::Static(enabled)
    }
}

impl fmt::Debug for Enablement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(enabled) => f.debug_tuple("Static").field(enabled).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_policy_ignores_request_content() {
        let always = Enablement::Static(true);
        let never = Enablement::Static(false);
        let loaded = Request::get("/x").with_header("x-profile", "wall");

        assert_eq!(always.evaluate(&loaded), Decision::enabled());
        assert_eq!(always.evaluate(&Request::default()), Decision::enabled());
        assert_eq!(never.evaluate(&loaded), Decision::Disabled);
        assert_eq!(never.evaluate(&Request::default()), Decision::Disabled);
    }

    #[test]
    fn boolean_closure_maps_to_decision_without_override() {
        let policy = Enablement::when(|req| req.header("x-profile").is_some());

        let hit = policy.evaluate(&Request::get("/").with_header("x-profile", "1"));
        assert_eq!(hit, Decision::Enabled { mode: None });
        assert_eq!(policy.evaluate(&Request::default()), Decision::Disabled);
    }

    #[test]
    fn closure_can_override_the_mode() {
        let policy = Enablement::when(|req| match req.header("x-profile") {
            Some("wall") => Decision::with_mode(Mode::Wall),
            Some(_) => Decision::enabled(),
            None => Decision::Disabled,
        });

        let decision = policy.evaluate(&Request::get("/").with_header("x-profile", "wall"));
        assert_eq!(decision.mode_override(), Some(Mode::Wall));
        assert!(decision.is_enabled());
    }

    #[test]
    fn empty_context_is_the_policys_problem_not_a_panic() {
        // A policy that defaults on absent keys evaluates cleanly against
        // the empty administrative context.
        let policy = Enablement::when(|req| req.header("x-debug").unwrap_or("off") == "on");
        assert_eq!(policy.evaluate(&Request::default()), Decision::Disabled);
    }
}
