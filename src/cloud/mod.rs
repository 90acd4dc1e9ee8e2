//! Control-plane integration over HTTP.
//!
//! This module provides the reference collaborators behind the generic core:
//! a JSON/REST [`RestClient`], an HTTP status [`HttpProbe`], and artifact
//! deployment with post-deploy verification.

mod client;
mod context;
mod deploy;
mod probe;
mod types;

pub use client::RestClient;
pub use context::CloudContext;
pub use deploy::{Deployer, DeploymentReport, VerifiedDeployment, ZipDeployer};
pub use probe::HttpProbe;
pub use types::GenericResource;
