//! In-memory view of one remote resource.
//!
//! An entity pairs a resource's identity with the last snapshot fetched from
//! the control plane and a [`ResourceStatus`]. Every state-changing remote
//! call goes through [`ResourceEntity::modify`], which holds the entity's
//! mutation lock, publishes a transient status while the call is in flight
//! and settles the status from a fresh remote read afterwards.

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, trace};

use crate::error::{CloudholdError, ResourceError, Result};

use super::module::CacheKey;
use super::remote::{Parent, ParentRef, RemoteClient, RemoteResource};
use super::status::ResourceStatus;

/// Proof that the holder owns an entity's mutation lock.
pub(crate) type MutationGuard<'a> = MutexGuard<'a, ()>;

/// Mutable part of an entity.
struct EntityState<R> {
    snapshot: Option<R>,
    status: ResourceStatus,
    loaded_at: Option<DateTime<Utc>>,
}

/// A cached remote resource.
pub struct ResourceEntity<C: RemoteClient> {
    name: String,
    resource_group: String,
    kind: String,
    derived_id: String,
    parent: Parent,
    client: Arc<C>,
    state: RwLock<EntityState<C::Remote>>,
    mutation: Mutex<()>,
}

impl<C: RemoteClient> ResourceEntity<C> {
    /// Creates an entity that has not been loaded yet.
    pub(crate) fn new(
        name: &str,
        resource_group: &str,
        kind: &str,
        parent: Parent,
        client: Arc<C>,
    ) -> Self {
        let state = EntityState {
            snapshot: None,
            status: ResourceStatus::Unknown,
            loaded_at: None,
        };
        Self::with_state(name, resource_group, kind, parent, client, state)
    }

    /// Creates an entity from a listed remote representation.
    pub(crate) fn from_remote(
        remote: C::Remote,
        resource_group: &str,
        kind: &str,
        parent: Parent,
        client: Arc<C>,
    ) -> Self {
        let name = remote.name().to_string();
        let state = EntityState {
            snapshot: Some(remote),
            status: ResourceStatus::Ok,
            loaded_at: Some(Utc::now()),
        };
        Self::with_state(&name, resource_group, kind, parent, client, state)
    }

    fn with_state(
        name: &str,
        resource_group: &str,
        kind: &str,
        parent: Parent,
        client: Arc<C>,
        state: EntityState<C::Remote>,
    ) -> Self {
        let derived_id = parent.child_id(kind, resource_group, name);
        Self {
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            kind: kind.to_string(),
            derived_id,
            parent,
            client,
            state: RwLock::new(state),
            mutation: Mutex::new(()),
        }
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource group.
    #[must_use]
    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Collection name of this resource's kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Owner of this resource.
    #[must_use]
    pub const fn parent(&self) -> &Parent {
        &self.parent
    }

    pub(crate) const fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Cache key of this entity.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.resource_group, &self.name)
    }

    /// Fully-qualified identifier: the remote one once loaded, the derived one before.
    pub async fn id(&self) -> String {
        let state = self.state.read().await;
        state
            .snapshot
            .as_ref()
            .map_or_else(|| self.derived_id.clone(), |remote| remote.id().to_string())
    }

    /// Current status.
    pub async fn status(&self) -> ResourceStatus {
        self.state.read().await.status
    }

    /// Last known remote representation.
    pub async fn snapshot(&self) -> Option<C::Remote> {
        self.state.read().await.snapshot.clone()
    }

    /// When the remote representation was last observed.
    pub async fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.loaded_at
    }

    /// Builds the relation child modules of this resource hold.
    pub async fn as_parent(&self) -> ParentRef {
        ParentRef {
            id: self.id().await,
            name: self.name.clone(),
            resource_group: self.resource_group.clone(),
        }
    }

    /// Re-reads the resource from the control plane.
    ///
    /// While another caller's mutation is in flight only the snapshot is
    /// updated; the transient status is left for that mutation to settle.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the remote read fails; the status is
    /// then `ERROR` and the snapshot is left untouched.
    pub async fn refresh(&self) -> Result<()> {
        self.reload(false).await
    }

    /// Re-reads the resource on behalf of the mutation lock holder, always
    /// settling the status.
    pub(crate) async fn refresh_locked(&self, _guard: &MutationGuard<'_>) -> Result<()> {
        self.reload(true).await
    }

    async fn reload(&self, settle: bool) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if !state.status.is_transient() {
                state.status = ResourceStatus::Loading;
            }
        }

        trace!("Refreshing {}", self.display_key());
        let fetched = self.client.get(&self.name, &self.resource_group).await;

        let mut state = self.state.write().await;
        let keep_status = !settle && state.status.is_transient();
        if keep_status {
            trace!("{} is {}, leaving status to the mutation", self.display_key(), state.status);
        }

        match fetched {
            Ok(Some(remote)) => {
                state.snapshot = Some(remote);
                state.loaded_at = Some(Utc::now());
                if !keep_status {
                    state.status = ResourceStatus::Ok;
                }
                Ok(())
            }
            Ok(None) => {
                debug!("{} does not exist remotely", self.display_key());
                state.snapshot = None;
                state.loaded_at = Some(Utc::now());
                if !keep_status {
                    state.status = ResourceStatus::NotExist;
                }
                Ok(())
            }
            Err(source) => {
                if !keep_status {
                    state.status = ResourceStatus::Error;
                }
                Err(ResourceError::transport("get", self.display_key(), source).into())
            }
        }
    }

    /// Runs a state-changing remote call, then refreshes.
    ///
    /// `transient` is published as the status while `action` runs. If
    /// `action` fails the status becomes `ERROR` and the failure is returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns the action's error, or the refresh error if the follow-up
    /// read fails.
    pub async fn modify<F, Fut, T>(&self, action: F, transient: ResourceStatus) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let guard = self.lock_mutations().await;
        self.modify_locked(&guard, action, transient).await
    }

    /// Restarts the resource remotely under the `RESTARTING` status.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the restart call fails (including kinds
    /// that do not support restarting), or the refresh error afterwards.
    pub async fn restart(&self) -> Result<()> {
        let id = self.id().await;
        let resource = self.display_key();
        let client = Arc::clone(&self.client);

        self.modify(
            || async move {
                client
                    .restart(&id)
                    .await
                    .map_err(|source| CloudholdError::from(ResourceError::transport("restart", resource, source)))
            },
            ResourceStatus::Restarting,
        )
        .await
    }

    /// Whether the resource exists, loading it first if it was never loaded.
    ///
    /// # Errors
    ///
    /// Returns the refresh error if a first load was needed and failed.
    pub async fn exists(&self) -> Result<bool> {
        if self.status().await == ResourceStatus::Unknown {
            self.refresh().await?;
        }
        Ok(self.status().await.is_present())
    }

    pub(crate) async fn lock_mutations(&self) -> MutationGuard<'_> {
        self.mutation.lock().await
    }

    pub(crate) async fn modify_locked<F, Fut, T>(
        &self,
        guard: &MutationGuard<'_>,
        action: F,
        transient: ResourceStatus,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let value = self.mutate_locked(guard, action, transient).await?;
        self.refresh_locked(guard).await?;
        Ok(value)
    }

    /// Runs `action` under `transient` without the follow-up refresh.
    pub(crate) async fn mutate_locked<F, Fut, T>(
        &self,
        _guard: &MutationGuard<'_>,
        action: F,
        transient: ResourceStatus,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.set_status(transient).await;
        debug!("{} -> {transient}", self.display_key());

        match action().await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.set_status(ResourceStatus::Error).await;
                Err(err)
            }
        }
    }

    pub(crate) async fn mark_not_exist(&self) {
        let mut state = self.state.write().await;
        state.snapshot = None;
        state.status = ResourceStatus::NotExist;
    }

    /// Applies a listed representation unless a mutation is in flight.
    pub(crate) async fn apply_listed(&self, remote: C::Remote) -> bool {
        let mut state = self.state.write().await;
        if state.status.is_transient() {
            return false;
        }
        state.snapshot = Some(remote);
        state.status = ResourceStatus::Ok;
        state.loaded_at = Some(Utc::now());
        true
    }

    /// Marks the entity missing after a listing that did not contain it,
    /// unless a mutation is in flight.
    pub(crate) async fn apply_unlisted(&self) -> bool {
        let mut state = self.state.write().await;
        if state.status.is_transient() || state.status == ResourceStatus::NotExist {
            return false;
        }
        state.snapshot = None;
        state.status = ResourceStatus::NotExist;
        state.loaded_at = Some(Utc::now());
        true
    }

    async fn set_status(&self, status: ResourceStatus) {
        self.state.write().await.status = status;
    }

    pub(crate) fn display_key(&self) -> String {
        format!("{} '{}/{}'", self.kind, self.resource_group, self.name)
    }
}

impl<C: RemoteClient> fmt::Debug for ResourceEntity<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntity")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("resource_group", &self.resource_group)
            .field("id", &self.derived_id)
            .finish_non_exhaustive()
    }
}
