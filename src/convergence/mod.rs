//! Convergence verification after remote mutations.
//!
//! - [`Probe`]: a repeatable, read-only health check
//! - [`ConvergenceVerifier`]: bounded polling of a probe

mod probe;
mod verifier;

pub use probe::{FnProbe, Probe, ProbeOutcome};
pub use verifier::{
    CancelHandle, Convergence, ConvergenceVerifier, DEFAULT_INITIAL_DELAY_SECS,
    DEFAULT_INTERVAL_SECS, DEFAULT_MAX_ATTEMPTS, VerifierConfig,
};
