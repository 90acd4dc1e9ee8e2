//! Staged create-or-update proposals.
//!
//! A [`Draft`] collects attribute values and applies them in one remote call
//! on [`Draft::commit`]. Updates merge the staged fields onto the cached
//! snapshot; creates send the staged fields alone.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CloudholdError, ResourceError, Result};

use super::entity::ResourceEntity;
use super::remote::{Definition, RemoteClient, RemoteResource};
use super::status::ResourceStatus;

/// What a draft is allowed to do on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    /// Create only; committing fails if the target already exists.
    Create,
    /// Update the target, creating it if it does not exist.
    UpdateOrCreate,
}

/// A staged create-or-update of one entity.
pub struct Draft<C: RemoteClient> {
    id: Uuid,
    target: Arc<ResourceEntity<C>>,
    mode: DraftMode,
    fields: Definition,
    committed: bool,
}

impl<C: RemoteClient> Draft<C> {
    pub(crate) fn new(target: Arc<ResourceEntity<C>>, mode: DraftMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            mode,
            fields: Definition::new(),
            committed: false,
        }
    }

    /// Correlation id of this draft.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Entity this draft applies to.
    #[must_use]
    pub const fn target(&self) -> &Arc<ResourceEntity<C>> {
        &self.target
    }

    /// Commit mode.
    #[must_use]
    pub const fn mode(&self) -> DraftMode {
        self.mode
    }

    /// Staged fields.
    #[must_use]
    pub const fn fields(&self) -> &Definition {
        &self.fields
    }

    /// Staged value of one field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Whether the draft has been committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    /// Stages one field.
    ///
    /// # Errors
    ///
    /// Returns `CommitReuse` if the draft was already committed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<&mut Self> {
        self.ensure_open()?;
        self.fields.insert(key.into(), value.into());
        Ok(self)
    }

    /// Stages several fields at once.
    ///
    /// # Errors
    ///
    /// Returns `CommitReuse` if the draft was already committed.
    pub fn set_all(&mut self, fields: Definition) -> Result<&mut Self> {
        self.ensure_open()?;
        self.fields.extend(fields);
        Ok(self)
    }

    /// Applies the draft remotely and returns the refreshed entity.
    ///
    /// # Errors
    ///
    /// Returns `CommitReuse` on a second commit (without a remote call),
    /// `AlreadyExists` for a create draft whose target exists, the transport
    /// error of the first load of a target that was never read, or the
    /// transport error of the create-or-update call. On a transport error
    /// the entity's status is `ERROR` and its snapshot is unchanged.
    pub async fn commit(&mut self) -> Result<Arc<ResourceEntity<C>>> {
        self.ensure_open()?;
        self.committed = true;

        let target = Arc::clone(&self.target);
        let guard = target.lock_mutations().await;

        // Never-loaded targets are read first so an update keeps unset fields
        // and a create cannot overwrite an existing resource.
        let loaded = target.snapshot().await.is_some()
            || target.status().await == ResourceStatus::NotExist;
        if !loaded {
            target.refresh_locked(&guard).await?;
        }
        let snapshot = target.snapshot().await;

        if self.mode == DraftMode::Create && snapshot.is_some() {
            return Err(ResourceError::AlreadyExists {
                resource: target.display_key(),
            }
            .into());
        }

        let (definition, transient) = match &snapshot {
            Some(remote) => {
                let mut merged = remote.definition();
                merged.extend(self.fields.clone());
                (merged, ResourceStatus::Updating)
            }
            None => (self.fields.clone(), ResourceStatus::Creating),
        };

        debug!(
            "Committing draft {} for {} ({} fields, {transient})",
            self.id,
            target.display_key(),
            definition.len()
        );

        let client = Arc::clone(target.client());
        let parent = target.parent().clone();
        let resource_group = target.resource_group().to_string();
        let name = target.name().to_string();
        let resource = target.display_key();

        target
            .modify_locked(
                &guard,
                || async move {
                    client
                        .create_or_update(&parent, &resource_group, &name, &definition)
                        .await
                        .map_err(|source| {
                            CloudholdError::from(ResourceError::transport("create_or_update", resource, source))
                        })
                },
                transient,
            )
            .await?;

        drop(guard);
        Ok(target)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.committed {
            return Err(ResourceError::CommitReuse {
                resource: self.target.display_key(),
            }
            .into());
        }
        Ok(())
    }
}

impl<C: RemoteClient> fmt::Debug for Draft<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Draft")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("mode", &self.mode)
            .field("fields", &self.fields)
            .field("committed", &self.committed)
            .finish()
    }
}
