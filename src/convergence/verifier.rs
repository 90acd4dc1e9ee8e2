//! Bounded polling until a remote action converges.
//!
//! Accepting a mutation does not mean the remote side is serving it. The
//! verifier waits out a grace period, then probes at a fixed interval until
//! the probe reports healthy, reports a hard failure, or the attempt budget
//! is spent. At most `max_attempts` probes are ever issued.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::VerifierSettings;
use crate::error::{CloudholdError, ConvergenceError, Result};

use super::probe::{Probe, ProbeOutcome};

/// Default grace period before the first probe, in seconds.
pub const DEFAULT_INITIAL_DELAY_SECS: u64 = 60;

/// Default wait between probes, in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 2;

/// Default probe budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;

/// Timing and budget of one verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Wait before the first probe.
    pub initial_delay: Duration,
    /// Wait between probes.
    pub interval: Duration,
    /// Maximum number of probe invocations; values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Per-probe deadline; a probe exceeding it counts as not yet healthy.
    pub probe_timeout: Option<Duration>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(DEFAULT_INITIAL_DELAY_SECS),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            probe_timeout: None,
        }
    }
}

impl VerifierConfig {
    /// Creates a configuration without a per-probe deadline.
    #[must_use]
    pub const fn new(initial_delay: Duration, interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            interval,
            max_attempts,
            probe_timeout: None,
        }
    }

    /// Sets the per-probe deadline.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Effective probe budget.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Upper bound on waiting time: `initial_delay + max_attempts * interval`,
    /// saturating at [`Duration::MAX`].
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.attempts())
            .and_then(|waits| self.initial_delay.checked_add(waits))
            .unwrap_or(Duration::MAX)
    }
}

impl From<&VerifierSettings> for VerifierConfig {
    fn from(settings: &VerifierSettings) -> Self {
        Self {
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            interval: Duration::from_secs(settings.interval_secs),
            max_attempts: settings.max_attempts,
            probe_timeout: settings.probe_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Successful verification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Convergence {
    /// What was verified.
    pub target: String,
    /// Probe invocations made, including the healthy one.
    pub attempts: u32,
    /// Time from the start of verification to the healthy probe.
    pub elapsed: Duration,
}

/// Lets a caller abort a running verification.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a handle in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Requests cancellation. Verification stops at its next wait.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// States of one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    WaitingInitial,
    Probing,
    Succeeded,
    Exhausted,
    Failed(String),
}

/// Polls a [`Probe`] until it reports convergence or the budget runs out.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceVerifier {
    config: VerifierConfig,
}

impl ConvergenceVerifier {
    /// Creates a verifier.
    #[must_use]
    pub const fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Verifier configuration.
    #[must_use]
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Runs verification on a background task and waits for its verdict.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the budget is spent, `Unhealthy` on a hard
    /// failure, or `ProbeFailed` if the probe itself errors.
    pub async fn verify(&self, probe: Arc<dyn Probe>) -> Result<Convergence> {
        self.spawn(probe, None).await
    }

    /// Like [`Self::verify`], but stops with `Cancelled` once `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`Self::verify`], plus `Cancelled`.
    pub async fn verify_with_cancel(
        &self,
        probe: Arc<dyn Probe>,
        cancel: &CancelHandle,
    ) -> Result<Convergence> {
        self.spawn(probe, Some(cancel.subscribe())).await
    }

    async fn spawn(
        &self,
        probe: Arc<dyn Probe>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<Convergence> {
        let config = self.config.clone();
        let handle = tokio::spawn(run(config, probe, cancel));
        let _guard = AbortOnDrop(handle.abort_handle());

        handle
            .await
            .map_err(|e| CloudholdError::internal(format!("Verifier task failed: {e}")))?
    }
}

/// Stops the verification task when the waiting caller goes away.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run(
    config: VerifierConfig,
    probe: Arc<dyn Probe>,
    mut cancel: Option<watch::Receiver<bool>>,
) -> Result<Convergence> {
    let target = probe.describe();
    let max_attempts = config.attempts();
    let started = Instant::now();

    let mut phase = Phase::WaitingInitial;
    let mut attempts = 0;
    let mut last = String::new();

    loop {
        phase = match phase {
            Phase::WaitingInitial => {
                debug!("Waiting {:?} before probing {target}", config.initial_delay);
                if !pause(config.initial_delay, &mut cancel).await {
                    return Err(ConvergenceError::Cancelled { target }.into());
                }
                Phase::Probing
            }
            Phase::Probing => {
                attempts += 1;
                let observed = invoke(probe.as_ref(), config.probe_timeout)
                    .await
                    .map_err(|e| ConvergenceError::ProbeFailed {
                        target: target.clone(),
                        attempt: attempts,
                        message: e.to_string(),
                    })?;
                last = observed.as_ref().map_or_else(
                    || format!("no answer within {:?}", config.probe_timeout.unwrap_or_default()),
                    ToString::to_string,
                );
                debug!("Probe {attempts}/{max_attempts} for {target}: {last}");

                match observed.unwrap_or(ProbeOutcome::NotYetHealthy) {
                    ProbeOutcome::Healthy => Phase::Succeeded,
                    ProbeOutcome::HardFailure(reason) => Phase::Failed(reason),
                    ProbeOutcome::NotYetHealthy if attempts >= max_attempts => Phase::Exhausted,
                    ProbeOutcome::NotYetHealthy => {
                        if !pause(config.interval, &mut cancel).await {
                            return Err(ConvergenceError::Cancelled { target }.into());
                        }
                        Phase::Probing
                    }
                }
            }
            Phase::Succeeded => {
                return Ok(Convergence {
                    target,
                    attempts,
                    elapsed: started.elapsed(),
                });
            }
            Phase::Exhausted => {
                warn!("{target} did not converge after {attempts} probes");
                return Err(ConvergenceError::Timeout {
                    target,
                    attempts,
                    last,
                }
                .into());
            }
            Phase::Failed(reason) => {
                return Err(ConvergenceError::Unhealthy { target, reason }.into());
            }
        };
    }
}

/// Runs one probe; `None` means it missed its deadline.
async fn invoke(probe: &dyn Probe, timeout: Option<Duration>) -> Result<Option<ProbeOutcome>> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, probe.probe()).await {
            Ok(outcome) => outcome.map(Some),
            Err(_) => Ok(None),
        },
        None => probe.probe().await.map(Some),
    }
}

/// Sleeps for `duration`; returns false if cancelled first.
async fn pause(duration: Duration, cancel: &mut Option<watch::Receiver<bool>>) -> bool {
    let Some(receiver) = cancel.as_mut() else {
        tokio::time::sleep(duration).await;
        return true;
    };

    if *receiver.borrow_and_update() {
        return false;
    }

    // `sleep` clamps far-future deadlines instead of overflowing
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            changed = receiver.changed() => {
                if changed.is_err() {
                    // handle dropped; nobody can cancel any more
                    sleep.await;
                    return true;
                }
                if *receiver.borrow_and_update() {
                    return false;
                }
            }
        }
    }
}
