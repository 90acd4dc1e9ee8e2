//! Artifact deployment followed by convergence verification.
//!
//! A deployment endpoint accepting an upload only means the artifact was
//! received. [`VerifiedDeployment`] pairs a [`Deployer`] with a
//! [`ConvergenceVerifier`] so the caller learns whether the target actually
//! came up healthy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::convergence::{CancelHandle, Convergence, ConvergenceVerifier, Probe};
use crate::error::{CloudholdError, RemoteError, ResourceError, Result};

/// Upload timeout in seconds.
const UPLOAD_TIMEOUT_SECS: u64 = 600;

/// Pushes an artifact to a target.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Uploads `artifact`; returns once the target has accepted it.
    async fn deploy(&self, artifact: &Path) -> Result<()>;

    /// Human-readable deployment target.
    fn describe(&self) -> String;
}

/// Deploys a zip package with a single authenticated POST.
#[derive(Debug, Clone)]
pub struct ZipDeployer {
    client: Client,
    url: String,
    token: Option<String>,
}

impl ZipDeployer {
    /// Creates a deployer posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| CloudholdError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            token: None,
        })
    }

    /// Sends a bearer token with the upload.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn failure(&self, source: RemoteError) -> CloudholdError {
        ResourceError::transport("deploy", self.url.clone(), source).into()
    }
}

#[async_trait]
impl Deployer for ZipDeployer {
    async fn deploy(&self, artifact: &Path) -> Result<()> {
        let bytes = tokio::fs::read(artifact).await?;
        info!("Uploading {} ({} bytes) to {}", artifact.display(), bytes.len(), self.url);

        let mut request = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/zip")
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.failure(RemoteError::network(format!("Upload failed: {e}"))))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(self.failure(RemoteError::AuthenticationFailed {
                message: format!("{status} from deployment endpoint"),
            }));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(RemoteError::api_error(status.as_u16(), body)));
        }

        Ok(())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Outcome of a verified deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    /// Deployment target.
    pub target: String,
    /// When the upload was accepted.
    pub deployed_at: DateTime<Utc>,
    /// Verification result; `None` when no probe was configured.
    pub convergence: Option<Convergence>,
}

/// Deploys an artifact, then waits for the target to report healthy.
pub struct VerifiedDeployment {
    deployer: Arc<dyn Deployer>,
    verifier: ConvergenceVerifier,
    probe: Option<Arc<dyn Probe>>,
}

impl VerifiedDeployment {
    /// Creates a handler that skips verification until a probe is set.
    #[must_use]
    pub fn new(deployer: Arc<dyn Deployer>, verifier: ConvergenceVerifier) -> Self {
        Self {
            deployer,
            verifier,
            probe: None,
        }
    }

    /// Verifies the deployment with `probe`.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Deploys `artifact` and verifies convergence.
    ///
    /// # Errors
    ///
    /// Returns the deployer's error if the upload fails, or a convergence
    /// error if the target never reports healthy.
    pub async fn run(&self, artifact: &Path) -> Result<DeploymentReport> {
        self.run_inner(artifact, None).await
    }

    /// Like [`Self::run`], but verification stops once `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`Self::run`], plus `Cancelled`.
    pub async fn run_with_cancel(
        &self,
        artifact: &Path,
        cancel: &CancelHandle,
    ) -> Result<DeploymentReport> {
        self.run_inner(artifact, Some(cancel)).await
    }

    async fn run_inner(
        &self,
        artifact: &Path,
        cancel: Option<&CancelHandle>,
    ) -> Result<DeploymentReport> {
        let target = self.deployer.describe();
        self.deployer.deploy(artifact).await?;
        let deployed_at = Utc::now();

        let Some(probe) = &self.probe else {
            info!("Deployed to {target}; no health probe configured");
            return Ok(DeploymentReport {
                target,
                deployed_at,
                convergence: None,
            });
        };

        info!(
            "Deployed to {target}; waiting {:?} before checking health",
            self.verifier.config().initial_delay
        );
        let verdict = match cancel {
            Some(cancel) => self.verifier.verify_with_cancel(Arc::clone(probe), cancel).await,
            None => self.verifier.verify(Arc::clone(probe)).await,
        };

        match verdict {
            Ok(convergence) => {
                info!("{target} is healthy after {} probes", convergence.attempts);
                Ok(DeploymentReport {
                    target,
                    deployed_at,
                    convergence: Some(convergence),
                })
            }
            Err(e) => {
                warn!("Deployment to {target} was accepted but the target is not healthy: {e}");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for VerifiedDeployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedDeployment")
            .field("target", &self.deployer.describe())
            .field("verifier", &self.verifier)
            .field("probe", &self.probe.as_ref().map(|p| p.describe()))
            .finish()
    }
}
