//! Generic resource cache, lifecycle and staged mutations.
//!
//! This module is written once against the [`RemoteClient`] capability set:
//! - [`ResourceEntity`]: one cached resource with a status
//! - [`ResourceModule`]: a keyed collection of entities under one parent
//! - [`Draft`]: a staged create-or-update applied on commit

mod draft;
mod entity;
mod id;
mod module;
mod remote;
mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use draft::{Draft, DraftMode};
pub use entity::ResourceEntity;
pub use id::ResourceId;
pub use module::{CacheKey, ResourceModule};
pub use remote::{
    Definition, Parent, ParentRef, RemoteClient, RemoteResource, RemoteResult, RootScope,
};
pub use status::ResourceStatus;
