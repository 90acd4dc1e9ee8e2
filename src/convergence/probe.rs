//! Read-only health probes.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;

use crate::error::Result;

/// What a single probe invocation observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The target is healthy; verification can stop.
    Healthy,
    /// The target is not ready yet; try again later.
    NotYetHealthy,
    /// The target failed in a way more waiting will not fix.
    HardFailure(String),
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::NotYetHealthy => f.write_str("not yet healthy"),
            Self::HardFailure(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A side-effect free status check that may be called repeatedly.
///
/// Returning `Err` means the probe itself could not run, which ends
/// verification; an unready target is `Ok(ProbeOutcome::NotYetHealthy)`.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Runs the check once.
    async fn probe(&self) -> Result<ProbeOutcome>;

    /// Human-readable name of what is probed.
    fn describe(&self) -> String {
        String::from("probe")
    }
}

/// Adapts an async closure into a [`Probe`].
pub struct FnProbe<F> {
    name: String,
    check: F,
}

impl<F, Fut> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProbeOutcome>> + Send,
{
    /// Wraps `check` under a descriptive name.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProbeOutcome>> + Send,
{
    async fn probe(&self) -> Result<ProbeOutcome> {
        (self.check)().await
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnProbe<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProbe").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_fn_probe_runs_closure_each_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let probe = FnProbe::new("host 'api'", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(if n == 0 {
                    ProbeOutcome::NotYetHealthy
                } else {
                    ProbeOutcome::Healthy
                })
            }
        });

        assert_eq!(probe.describe(), "host 'api'");
        assert_eq!(probe.probe().await.unwrap(), ProbeOutcome::NotYetHealthy);
        assert_eq!(probe.probe().await.unwrap(), ProbeOutcome::Healthy);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ProbeOutcome::Healthy.to_string(), "healthy");
        assert_eq!(
            ProbeOutcome::HardFailure(String::from("state Error")).to_string(),
            "failed: state Error"
        );
    }
}
