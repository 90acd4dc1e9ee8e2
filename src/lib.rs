// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Cloudhold
//!
//! A cache-consistent control layer for hierarchical cloud resources, with
//! verified convergence after remote actions.
//!
//! ## Overview
//!
//! Cloudhold keeps one in-memory entity per remote resource and lets you:
//!
//! - Look resources up, list collections and reconcile the cache with them
//! - Stage creates and updates as drafts that commit in a single remote call
//! - Delete resources idempotently
//! - Poll a health probe until a deployment has actually converged
//!
//! ## Architecture
//!
//! The core is written once against a narrow client interface:
//!
//! 1. **Entity**: one cached resource with a lifecycle status
//! 2. **Module**: a keyed collection of entities under one parent
//! 3. **Draft**: a staged mutation applied on commit
//! 4. **Verifier**: bounded polling of a probe after a mutation
//!
//! ## Modules
//!
//! - [`resource`]: Generic entities, modules and drafts
//! - [`convergence`]: Probes and the convergence verifier
//! - [`cloud`]: REST client, HTTP probe and artifact deployment
//! - [`access`]: Firewall access toggles for database servers
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! context:
//!   endpoint: https://management.example.com
//!   subscription_id: 00000000-0000-0000-0000-000000000000
//! verifier:
//!   initial_delay_secs: 60
//!   interval_secs: 2
//!   max_attempts: 15
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod access;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod convergence;
pub mod error;
pub mod resource;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cloud::{CloudContext, HttpProbe, RestClient, VerifiedDeployment, ZipDeployer};
pub use config::{CloudholdConfig, ConfigParser, ConfigValidator};
pub use convergence::{CancelHandle, ConvergenceVerifier, Probe, ProbeOutcome, VerifierConfig};
pub use error::{CloudholdError, Result};
pub use resource::{
    Draft, DraftMode, Parent, ParentRef, RemoteClient, RemoteResource, ResourceEntity,
    ResourceModule, ResourceStatus,
};
