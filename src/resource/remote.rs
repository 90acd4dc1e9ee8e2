//! Capability interface every resource kind implements.
//!
//! The cache, draft and module logic is written once against
//! [`RemoteClient`]; a concrete kind only supplies the four remote calls, an
//! optional restart, and a representation type implementing
//! [`RemoteResource`].

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{RemoteError, ResourceError};

use super::id::ResourceId;

/// Attribute map used for create-or-update requests.
pub type Definition = serde_json::Map<String, serde_json::Value>;

/// Result type returned by remote clients.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Remote representation of one resource.
pub trait RemoteResource: Clone + Send + Sync + 'static {
    /// Fully-qualified identifier reported by the control plane.
    fn id(&self) -> &str;

    /// Resource name.
    fn name(&self) -> &str;

    /// Resource group the resource lives in.
    fn resource_group(&self) -> &str;

    /// Writable attributes, used as the base of update drafts.
    fn definition(&self) -> Definition;
}

/// Remote calls for one resource kind.
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// Remote representation type.
    type Remote: RemoteResource;

    /// Fetches one resource; `None` means it does not exist.
    async fn get(&self, name: &str, resource_group: &str) -> RemoteResult<Option<Self::Remote>>;

    /// Lists every resource of this kind under `parent`.
    async fn list_by_parent(&self, parent: &Parent) -> RemoteResult<Vec<Self::Remote>>;

    /// Creates or replaces a resource.
    async fn create_or_update(
        &self,
        parent: &Parent,
        resource_group: &str,
        name: &str,
        definition: &Definition,
    ) -> RemoteResult<Self::Remote>;

    /// Deletes a resource by identifier.
    ///
    /// Returns [`RemoteError::NotFound`] if nothing exists under `id`.
    async fn delete(&self, id: &str) -> RemoteResult<()>;

    /// Restarts a resource by identifier.
    ///
    /// Kinds without a restart action keep the default, which reports
    /// [`RemoteError::Unsupported`].
    async fn restart(&self, id: &str) -> RemoteResult<()> {
        let _ = id;
        Err(RemoteError::Unsupported {
            operation: "restart",
        })
    }
}

/// Relation from a child module to the resource that owns it.
///
/// Holds identity only; it never keeps the parent alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentRef {
    /// Fully-qualified identifier of the parent.
    pub id: String,
    /// Parent name.
    pub name: String,
    /// Parent resource group.
    pub resource_group: String,
}

/// Scope of a top-level module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootScope {
    /// Subscription the module lists from.
    pub subscription_id: String,
    /// Provider namespace of the kind (e.g. `Microsoft.DBforPostgreSQL`).
    pub namespace: String,
}

/// Owner of a module: another resource, or nothing for top-level kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum Parent {
    /// Top-level module with no owning resource.
    Root(RootScope),
    /// Module owned by another resource.
    Resource(ParentRef),
}

impl Parent {
    /// Creates a top-level scope.
    #[must_use]
    pub fn root(subscription_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::Root(RootScope {
            subscription_id: subscription_id.into(),
            namespace: namespace.into(),
        })
    }

    /// Creates a resource scope from the parent's fully-qualified identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` if `id` is not a resource identifier.
    pub fn from_id(id: &str) -> Result<Self, ResourceError> {
        let parsed = ResourceId::parse(id)?;
        let name = parsed.name().ok_or_else(|| ResourceError::InvalidId {
            id: id.to_string(),
            reason: String::from("identifier has no resource name"),
        })?;

        Ok(Self::Resource(ParentRef {
            id: id.to_string(),
            name: name.to_string(),
            resource_group: parsed.resource_group_name().unwrap_or_default().to_string(),
        }))
    }

    /// Returns the parent's resource group, if there is a parent resource.
    #[must_use]
    pub fn resource_group(&self) -> Option<&str> {
        match self {
            Self::Root(_) => None,
            Self::Resource(parent) => Some(&parent.resource_group),
        }
    }

    /// Returns the parent's name, if there is a parent resource.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Root(_) => None,
            Self::Resource(parent) => Some(&parent.name),
        }
    }

    /// Identifier of the scope: the parent id, or the subscription for roots.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Root(scope) => format!("/subscriptions/{}", scope.subscription_id),
            Self::Resource(parent) => parent.id.clone(),
        }
    }

    /// Derives the identifier of a child of this scope.
    #[must_use]
    pub fn child_id(&self, kind: &str, resource_group: &str, name: &str) -> String {
        match self {
            Self::Root(scope) => ResourceId::top_level(
                &scope.subscription_id,
                resource_group,
                &scope.namespace,
                kind,
                name,
            )
            .to_string(),
            Self::Resource(parent) => ResourceId::parse(&parent.id).map_or_else(
                |_| format!("{}/{kind}/{name}", parent.id),
                |id| id.with_resource_group(resource_group).child(kind, name).to_string(),
            ),
        }
    }

    /// Path of the collection holding children of `kind`.
    #[must_use]
    pub fn collection_path(&self, kind: &str) -> String {
        match self {
            Self::Root(scope) => format!(
                "/subscriptions/{}/providers/{}/{kind}",
                scope.subscription_id, scope.namespace
            ),
            Self::Resource(parent) => format!("{}/{kind}", parent.id),
        }
    }
}
