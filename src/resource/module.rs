//! Collection of cached entities of one kind under one parent.
//!
//! A module owns the `(resource group, name) -> entity` cache. Lookups load
//! lazily, listings reconcile the cache against the remote collection, and
//! create/update requests hand out [`Draft`]s bound to the cached entity.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CloudholdError, RemoteError, ResourceError, Result};

use super::draft::{Draft, DraftMode};
use super::entity::ResourceEntity;
use super::id::ResourceId;
use super::remote::{Parent, RemoteClient, RemoteResource};
use super::status::ResourceStatus;

/// Resource group spellings that mean "the parent's resource group".
const PLACEHOLDER_RESOURCE_GROUPS: &[&str] = &["<none>", "-", "none"];

/// Cache key: resource group and name, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource_group: String,
    name: String,
}

impl CacheKey {
    /// Creates a key.
    #[must_use]
    pub fn new(resource_group: &str, name: &str) -> Self {
        Self {
            resource_group: resource_group.to_ascii_lowercase(),
            name: name.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

type EntityMap<C> = HashMap<CacheKey, Arc<ResourceEntity<C>>>;

/// Cached collection of one resource kind under one parent.
pub struct ResourceModule<C: RemoteClient> {
    kind: String,
    parent: Parent,
    client: Arc<C>,
    cache: Mutex<EntityMap<C>>,
}

impl<C: RemoteClient> ResourceModule<C> {
    /// Creates an empty module.
    #[must_use]
    pub fn new(kind: impl Into<String>, parent: Parent, client: Arc<C>) -> Self {
        Self {
            kind: kind.into(),
            parent,
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Collection name of this module's kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Owner of this module.
    #[must_use]
    pub const fn parent(&self) -> &Parent {
        &self.parent
    }

    /// Client used for remote calls.
    #[must_use]
    pub const fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Replaces an empty or placeholder resource group with the parent's.
    #[must_use]
    pub fn fix_resource_group(&self, resource_group: &str) -> String {
        let trimmed = resource_group.trim();
        let is_placeholder = trimmed.is_empty()
            || PLACEHOLDER_RESOURCE_GROUPS
                .iter()
                .any(|p| p.eq_ignore_ascii_case(trimmed));

        match (is_placeholder, self.parent.resource_group()) {
            (true, Some(parent_group)) => parent_group.to_string(),
            _ => trimmed.to_string(),
        }
    }

    /// Returns the entity for `(name, resource_group)`, loading it on a cache miss.
    ///
    /// The returned entity may be `NOT_EXIST`; use [`Self::get_existing`] to
    /// require presence.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the first load fails. The entity stays
    /// cached with status `ERROR`.
    pub async fn get(&self, name: &str, resource_group: &str) -> Result<Arc<ResourceEntity<C>>> {
        let (entity, inserted) = self.entry(name, resource_group).await;
        if inserted {
            entity.refresh().await?;
        }
        Ok(entity)
    }

    /// Looks an entity up by its fully-qualified identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier cannot be parsed or the load fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Arc<ResourceEntity<C>>> {
        let parsed = ResourceId::parse(id)?;
        let name = parsed.name().ok_or_else(|| ResourceError::InvalidId {
            id: id.to_string(),
            reason: String::from("identifier has no resource name"),
        })?;
        let resource_group = parsed.resource_group_name().unwrap_or_default();
        self.get(name, resource_group).await
    }

    /// Like [`Self::get`], but fails if the resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the entity is confirmed missing.
    pub async fn get_existing(
        &self,
        name: &str,
        resource_group: &str,
    ) -> Result<Arc<ResourceEntity<C>>> {
        let entity = self.get(name, resource_group).await?;
        if entity.exists().await? {
            Ok(entity)
        } else {
            Err(ResourceError::not_found(entity.display_key()).into())
        }
    }

    /// Whether `(name, resource_group)` exists, loading it if never loaded.
    ///
    /// # Errors
    ///
    /// Returns a transport error if a load was needed and failed.
    pub async fn exists(&self, name: &str, resource_group: &str) -> Result<bool> {
        let (entity, _) = self.entry(name, resource_group).await;
        entity.exists().await
    }

    /// Lists the remote collection and reconciles the cache with it.
    ///
    /// Existing entities are updated in place, new ones are added, and cached
    /// entities missing from the listing are marked `NOT_EXIST`. Entities
    /// with a mutation in flight are left to that mutation.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the listing fails; the cache is then
    /// unchanged.
    pub async fn list(&self) -> Result<Vec<Arc<ResourceEntity<C>>>> {
        let remotes = self.client.list_by_parent(&self.parent).await.map_err(|source| {
            ResourceError::transport("list", self.parent.collection_path(&self.kind), source)
        })?;

        let mut cache = self.cache.lock().await;
        let mut listed = Vec::with_capacity(remotes.len());
        let mut seen = HashSet::with_capacity(remotes.len());

        for remote in remotes {
            let resource_group = self.fix_resource_group(remote.resource_group());
            let key = CacheKey::new(&resource_group, remote.name());

            let entity = if let Some(existing) = cache.get(&key) {
                let existing = Arc::clone(existing);
                if !existing.apply_listed(remote).await {
                    debug!("Skipping {} while a mutation is in flight", existing.display_key());
                }
                existing
            } else {
                let created = Arc::new(ResourceEntity::from_remote(
                    remote,
                    &resource_group,
                    &self.kind,
                    self.parent.clone(),
                    Arc::clone(&self.client),
                ));
                Self::register_locked(&mut cache, key.clone(), Arc::clone(&created))?;
                created
            };

            if seen.insert(key) {
                listed.push(entity);
            }
        }

        let mut vanished = 0;
        for (key, entity) in cache.iter() {
            if !seen.contains(key) && entity.apply_unlisted().await {
                vanished += 1;
            }
        }

        debug!(
            "Listed {} {} under {} ({} no longer present)",
            listed.len(),
            self.kind,
            self.parent.id(),
            vanished
        );

        Ok(listed)
    }

    /// Starts a draft that creates `(name, resource_group)`.
    pub async fn create(&self, name: &str, resource_group: &str) -> Draft<C> {
        let (entity, _) = self.entry(name, resource_group).await;
        Draft::new(entity, DraftMode::Create)
    }

    /// Starts a draft that updates `(name, resource_group)`, creating it if missing.
    pub async fn update_or_create(&self, name: &str, resource_group: &str) -> Draft<C> {
        let (entity, _) = self.entry(name, resource_group).await;
        Draft::new(entity, DraftMode::UpdateOrCreate)
    }

    /// Deletes `(name, resource_group)` remotely and marks it `NOT_EXIST`.
    ///
    /// Deleting an entity already known to be missing makes no remote call.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the remote delete fails; the entity's
    /// status is then `ERROR`.
    pub async fn delete(&self, name: &str, resource_group: &str) -> Result<()> {
        let (entity, _) = self.entry(name, resource_group).await;
        let guard = entity.lock_mutations().await;

        if entity.status().await == ResourceStatus::NotExist {
            debug!("{} already deleted", entity.display_key());
            return Ok(());
        }

        let id = entity.id().await;
        let client = Arc::clone(&self.client);
        entity
            .mutate_locked(
                &guard,
                || async move {
                    let outcome = client.delete(&id).await;
                    match outcome {
                        Ok(()) | Err(RemoteError::NotFound { .. }) => Ok(()),
                        Err(source) => Err(CloudholdError::from(ResourceError::transport("delete", id, source))),
                    }
                },
                ResourceStatus::Deleting,
            )
            .await?;

        entity.mark_not_exist().await;
        debug!("Deleted {}", entity.display_key());
        Ok(())
    }

    /// Restarts `(name, resource_group)` and returns the refreshed entity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the resource does not exist, or the restart's
    /// transport error; the entity's status is then `ERROR`.
    pub async fn restart(&self, name: &str, resource_group: &str) -> Result<Arc<ResourceEntity<C>>> {
        let entity = self.get_existing(name, resource_group).await?;
        entity.restart().await?;
        Ok(entity)
    }

    /// Entities currently in the cache, in no particular order.
    pub async fn cached(&self) -> Vec<Arc<ResourceEntity<C>>> {
        self.cache.lock().await.values().cloned().collect()
    }

    /// Drops a `NOT_EXIST` entity from the cache.
    ///
    /// Returns true if an entity was removed.
    pub async fn evict(&self, name: &str, resource_group: &str) -> bool {
        let key = CacheKey::new(&self.fix_resource_group(resource_group), name);
        let mut cache = self.cache.lock().await;

        let removable = match cache.get(&key) {
            Some(entity) => entity.status().await == ResourceStatus::NotExist,
            None => false,
        };
        if removable {
            cache.remove(&key);
        }
        removable
    }

    /// Adds an entity built elsewhere to the cache.
    ///
    /// # Errors
    ///
    /// Returns `CacheKeyConflict` if a different entity is cached under the
    /// same key.
    pub async fn register(&self, entity: Arc<ResourceEntity<C>>) -> Result<()> {
        let mut cache = self.cache.lock().await;
        Self::register_locked(&mut cache, entity.cache_key(), entity)
    }

    fn register_locked(
        cache: &mut EntityMap<C>,
        key: CacheKey,
        entity: Arc<ResourceEntity<C>>,
    ) -> Result<()> {
        if let Some(existing) = cache.get(&key) {
            if Arc::ptr_eq(existing, &entity) {
                return Ok(());
            }
            return Err(ResourceError::CacheKeyConflict {
                key: key.to_string(),
            }
            .into());
        }
        cache.insert(key, entity);
        Ok(())
    }

    /// Returns the cached entity for a key, inserting an unloaded one if absent.
    async fn entry(&self, name: &str, resource_group: &str) -> (Arc<ResourceEntity<C>>, bool) {
        let resource_group = self.fix_resource_group(resource_group);
        let key = CacheKey::new(&resource_group, name);
        let mut cache = self.cache.lock().await;

        if let Some(existing) = cache.get(&key) {
            return (Arc::clone(existing), false);
        }

        let entity = Arc::new(ResourceEntity::new(
            name,
            &resource_group,
            &self.kind,
            self.parent.clone(),
            Arc::clone(&self.client),
        ));
        cache.insert(key, Arc::clone(&entity));
        (entity, true)
    }
}

impl<C: RemoteClient> fmt::Debug for ResourceModule<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceModule")
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::{StubClient, server_parent};
    use serde_json::json;

    fn rules(client: &Arc<StubClient>) -> ResourceModule<StubClient> {
        ResourceModule::new("firewallRules", server_parent(), Arc::clone(client))
    }

    #[tokio::test]
    async fn test_get_returns_same_entity() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);

        let first = module.get("office", "rg-db").await.unwrap();
        let second = module.get("office", "rg-db").await.unwrap();
        let third = module.get("OFFICE", "RG-DB").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &third));
        assert_eq!(client.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_entity() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = Arc::new(rules(&client));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let module = Arc::clone(&module);
                tokio::spawn(async move { module.get("office", "rg-db").await })
            })
            .collect();

        let mut entities = Vec::new();
        for handle in handles {
            entities.push(handle.await.unwrap().unwrap());
        }

        assert!(entities.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(module.cached().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resource_group_fix_up() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);

        assert_eq!(module.fix_resource_group(""), "rg-db");
        assert_eq!(module.fix_resource_group("<none>"), "rg-db");
        assert_eq!(module.fix_resource_group(" rg-other "), "rg-other");

        let explicit = module.get("office", "rg-db").await.unwrap();
        let blank = module.get("office", "").await.unwrap();
        let placeholder = module.get("office", "<none>").await.unwrap();

        assert!(Arc::ptr_eq(&explicit, &blank));
        assert!(Arc::ptr_eq(&explicit, &placeholder));
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);

        let by_name = module.get("office", "rg-db").await.unwrap();
        let by_id = module.get_by_id(&client.id_of("rg-db", "office")).await.unwrap();

        assert!(Arc::ptr_eq(&by_name, &by_id));
        assert!(module.get_by_id("garbage").await.is_err());
    }

    #[tokio::test]
    async fn test_get_existing_missing_is_not_found() {
        let client = Arc::new(StubClient::new());
        let module = rules(&client);

        let err = module.get_existing("ghost", "rg-db").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_failure_keeps_entity_cached_in_error() {
        let client = Arc::new(StubClient::new());
        client.fail_gets(true);
        let module = rules(&client);

        assert!(module.get("office", "rg-db").await.is_err());

        let cached = module.cached().await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].status().await, ResourceStatus::Error);
    }

    #[tokio::test]
    async fn test_list_reconciles_cache() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({"startIpAddress": "10.0.0.1"}));
        client.seed("rg-db", "vpn", json!({"startIpAddress": "10.0.0.2"}));
        let module = rules(&client);

        let office = module.get("office", "rg-db").await.unwrap();
        let stale = module.get("retired", "rg-db").await.unwrap();
        client.seed("rg-db", "retired", json!({}));
        stale.refresh().await.unwrap();
        client.remove("rg-db", "retired");
        assert_eq!(stale.status().await, ResourceStatus::Ok);

        let listed = module.list().await.unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(client.list_calls(), 1);
        assert!(listed.iter().any(|e| Arc::ptr_eq(e, &office)));
        assert_eq!(stale.status().await, ResourceStatus::NotExist);
        assert!(stale.snapshot().await.is_none());

        let vpn = module.get("vpn", "rg-db").await.unwrap();
        assert!(listed.iter().any(|e| Arc::ptr_eq(e, &vpn)));
        assert_eq!(vpn.status().await, ResourceStatus::Ok);
        // vpn came from the listing, no point lookup needed
        assert_eq!(client.get_calls(), 3);

        for entity in &listed {
            let same_key = module
                .cached()
                .await
                .into_iter()
                .filter(|c| c.cache_key() == entity.cache_key())
                .count();
            assert_eq!(same_key, 1);
        }
    }

    #[tokio::test]
    async fn test_list_updates_snapshot_in_place() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({"startIpAddress": "10.0.0.1"}));
        let module = rules(&client);
        let office = module.get("office", "rg-db").await.unwrap();

        client.seed("rg-db", "office", json!({"startIpAddress": "10.9.9.9"}));
        module.list().await.unwrap();

        let snapshot = office.snapshot().await.unwrap();
        assert_eq!(snapshot.definition()["startIpAddress"], json!("10.9.9.9"));
    }

    #[tokio::test]
    async fn test_list_leaves_in_flight_creation_alone() {
        let client = Arc::new(StubClient::new());
        let module = rules(&client);
        let (pending, _) = module.entry("new-rule", "rg-db").await;

        let guard = pending.lock_mutations().await;
        let status_during_list = pending
            .mutate_locked(
                &guard,
                || async {
                    module.list().await?;
                    Ok::<_, CloudholdError>(pending.status().await)
                },
                ResourceStatus::Creating,
            )
            .await
            .unwrap();

        assert_eq!(status_during_list, ResourceStatus::Creating);
    }

    #[tokio::test]
    async fn test_list_failure_leaves_cache_untouched() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);
        let office = module.get("office", "rg-db").await.unwrap();

        client.fail_lists(true);
        let err = module.list().await.unwrap_err();

        assert!(matches!(
            err,
            CloudholdError::Resource(ResourceError::Transport { operation: "list", .. })
        ));
        assert_eq!(office.status().await, ResourceStatus::Ok);
    }

    #[tokio::test]
    async fn test_delete_marks_not_exist() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);
        let office = module.get("office", "rg-db").await.unwrap();

        module.delete("office", "rg-db").await.unwrap();

        assert_eq!(office.status().await, ResourceStatus::NotExist);
        assert!(office.snapshot().await.is_none());
        assert_eq!(client.delete_calls(), 1);
        assert!(!client.contains("rg-db", "office"));
    }

    #[tokio::test]
    async fn test_second_delete_is_idempotent() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);

        module.delete("office", "rg-db").await.unwrap();
        module.delete("office", "rg-db").await.unwrap();

        assert_eq!(client.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_unknown_remote_not_found_succeeds() {
        let client = Arc::new(StubClient::new());
        let module = rules(&client);

        module.delete("ghost", "rg-db").await.unwrap();

        let ghost = module.get("ghost", "rg-db").await.unwrap();
        assert_eq!(ghost.status().await, ResourceStatus::NotExist);
        assert_eq!(client.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_sets_error() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);
        let office = module.get("office", "rg-db").await.unwrap();

        client.fail_deletes(true);
        let err = module.delete("office", "rg-db").await.unwrap_err();

        assert!(matches!(
            err,
            CloudholdError::Resource(ResourceError::Transport { operation: "delete", .. })
        ));
        assert_eq!(office.status().await, ResourceStatus::Error);
        assert!(office.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_deletes_reach_remote_once() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = Arc::new(rules(&client));

        let a = {
            let module = Arc::clone(&module);
            tokio::spawn(async move { module.delete("office", "rg-db").await })
        };
        let b = {
            let module = Arc::clone(&module);
            tokio::spawn(async move { module.delete("office", "rg-db").await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(client.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_evict_only_removes_missing() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);
        module.get("office", "rg-db").await.unwrap();

        assert!(!module.evict("office", "rg-db").await);

        module.delete("office", "rg-db").await.unwrap();
        assert!(module.evict("office", "rg-db").await);
        assert!(module.cached().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let client = Arc::new(StubClient::new());
        let module = rules(&client);
        let (cached, _) = module.entry("office", "rg-db").await;

        module.register(Arc::clone(&cached)).await.unwrap();

        let impostor = Arc::new(ResourceEntity::new(
            "office",
            "rg-db",
            "firewallRules",
            server_parent(),
            Arc::clone(&client),
        ));
        let err = module.register(impostor).await.unwrap_err();
        assert!(matches!(
            err,
            CloudholdError::Resource(ResourceError::CacheKeyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_exists_by_key() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);

        assert!(module.exists("office", "rg-db").await.unwrap());
        assert!(!module.exists("ghost", "rg-db").await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_existing() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);

        let office = module.restart("office", "").await.unwrap();

        assert_eq!(client.restart_calls(), 1);
        assert_eq!(office.status().await, ResourceStatus::Ok);
        assert!(Arc::ptr_eq(&office, &module.get("office", "rg-db").await.unwrap()));
    }

    #[tokio::test]
    async fn test_restart_missing_makes_no_remote_call() {
        let client = Arc::new(StubClient::new());
        let module = rules(&client);

        let err = module.restart("ghost", "rg-db").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(client.restart_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_during_delete_keeps_deleting_status() {
        let client = Arc::new(StubClient::new());
        client.seed("rg-db", "office", json!({}));
        let module = rules(&client);
        let office = module.get("office", "rg-db").await.unwrap();

        let guard = office.lock_mutations().await;
        let seen = office
            .mutate_locked(
                &guard,
                || async {
                    module.exists("office", "rg-db").await?;
                    office.refresh().await?;
                    module.list().await?;
                    Ok::<_, CloudholdError>(office.status().await)
                },
                ResourceStatus::Deleting,
            )
            .await
            .unwrap();

        assert_eq!(seen, ResourceStatus::Deleting);
    }
}
