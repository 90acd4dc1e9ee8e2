//! In-memory client used by the resource tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::RemoteError;

use super::remote::{Definition, Parent, ParentRef, RemoteClient, RemoteResource, RemoteResult};

const KIND: &str = "firewallRules";

pub(crate) fn server_parent() -> Parent {
    Parent::Resource(ParentRef {
        id: String::from(
            "/subscriptions/sub-1/resourceGroups/rg-db/providers/Microsoft.DBforPostgreSQL/servers/pg-1",
        ),
        name: String::from("pg-1"),
        resource_group: String::from("rg-db"),
    })
}

#[derive(Debug, Clone)]
pub(crate) struct StubResource {
    id: String,
    name: String,
    resource_group: String,
    properties: Definition,
}

impl RemoteResource for StubResource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn resource_group(&self) -> &str {
        &self.resource_group
    }

    fn definition(&self) -> Definition {
        self.properties.clone()
    }
}

#[derive(Debug, Default)]
pub(crate) struct StubClient {
    resources: Mutex<HashMap<(String, String), StubResource>>,
    gets: AtomicUsize,
    lists: AtomicUsize,
    creates: AtomicUsize,
    deletes: AtomicUsize,
    restarts: AtomicUsize,
    failing_gets: AtomicBool,
    failing_lists: AtomicBool,
    failing_creates: AtomicBool,
    failing_deletes: AtomicBool,
}

impl StubClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn id_of(&self, resource_group: &str, name: &str) -> String {
        server_parent().child_id(KIND, resource_group, name)
    }

    pub(crate) fn seed(&self, resource_group: &str, name: &str, properties: Value) {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Definition::new(),
        };
        let resource = StubResource {
            id: self.id_of(resource_group, name),
            name: name.to_string(),
            resource_group: resource_group.to_string(),
            properties,
        };
        self.resources
            .lock()
            .unwrap()
            .insert((resource_group.to_string(), name.to_string()), resource);
    }

    pub(crate) fn remove(&self, resource_group: &str, name: &str) {
        self.resources
            .lock()
            .unwrap()
            .remove(&(resource_group.to_string(), name.to_string()));
    }

    pub(crate) fn contains(&self, resource_group: &str, name: &str) -> bool {
        self.resources
            .lock()
            .unwrap()
            .contains_key(&(resource_group.to_string(), name.to_string()))
    }

    pub(crate) fn definition_of(&self, resource_group: &str, name: &str) -> Option<Definition> {
        self.resources
            .lock()
            .unwrap()
            .get(&(resource_group.to_string(), name.to_string()))
            .map(|r| r.properties.clone())
    }

    pub(crate) fn fail_gets(&self, fail: bool) {
        self.failing_gets.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_lists(&self, fail: bool) {
        self.failing_lists.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_creates(&self, fail: bool) {
        self.failing_creates.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.failing_deletes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub(crate) fn restart_calls(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClient for StubClient {
    type Remote = StubResource;

    async fn get(&self, name: &str, resource_group: &str) -> RemoteResult<Option<StubResource>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing_gets.load(Ordering::SeqCst) {
            return Err(RemoteError::network("connection reset"));
        }
        Ok(self
            .resources
            .lock()
            .unwrap()
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_by_parent(&self, _parent: &Parent) -> RemoteResult<Vec<StubResource>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.failing_lists.load(Ordering::SeqCst) {
            return Err(RemoteError::api_error(500, "listing unavailable"));
        }
        Ok(self.resources.lock().unwrap().values().cloned().collect())
    }

    async fn create_or_update(
        &self,
        _parent: &Parent,
        resource_group: &str,
        name: &str,
        definition: &Definition,
    ) -> RemoteResult<StubResource> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.failing_creates.load(Ordering::SeqCst) {
            return Err(RemoteError::api_error(409, "conflicting operation"));
        }
        self.seed(resource_group, name, Value::Object(definition.clone()));
        self.resources
            .lock()
            .unwrap()
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::invalid_response("vanished after write"))
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(RemoteError::network("connection reset"));
        }
        let mut resources = self.resources.lock().unwrap();
        let key = resources
            .iter()
            .find(|(_, r)| r.id == id)
            .map(|(k, _)| k.clone());
        match key {
            Some(key) => {
                resources.remove(&key);
                Ok(())
            }
            None => Err(RemoteError::NotFound {
                resource: id.to_string(),
            }),
        }
    }

    async fn restart(&self, id: &str) -> RemoteResult<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        let known = self.resources.lock().unwrap().values().any(|r| r.id == id);
        if known {
            Ok(())
        } else {
            Err(RemoteError::NotFound {
                resource: id.to_string(),
            })
        }
    }
}
