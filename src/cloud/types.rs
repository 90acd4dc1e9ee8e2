//! Wire types of the JSON control-plane API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resource::{Definition, RemoteResource, ResourceId};

/// Server-managed properties that are never sent back on update.
const READ_ONLY_PROPERTIES: &[&str] = &["provisioningState"];

/// A resource as returned by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericResource {
    /// Fully-qualified identifier.
    pub id: String,
    /// Resource name.
    pub name: String,
    /// Resource type, e.g. `Microsoft.DBforPostgreSQL/servers/firewallRules`.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Region, for top-level kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Kind-specific attributes.
    #[serde(default)]
    pub properties: Definition,
    /// Resource group, derived from `id` on deserialization.
    #[serde(skip)]
    resource_group: String,
}

impl GenericResource {
    /// Fills the derived resource group from the identifier.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.resource_group = ResourceId::parse(&self.id)
            .ok()
            .and_then(|id| id.resource_group_name().map(ToString::to_string))
            .unwrap_or_default();
        self
    }

    /// Value of `properties.provisioningState`, if reported.
    #[must_use]
    pub fn provisioning_state(&self) -> Option<&str> {
        self.properties.get("provisioningState").and_then(Value::as_str)
    }
}

impl RemoteResource for GenericResource {
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
        let mut definition = self.properties.clone();
        for key in READ_ONLY_PROPERTIES {
            definition.remove(*key);
        }
        definition
    }
}

/// One page of a collection listing.
#[derive(Debug, Deserialize)]
pub(crate) struct ListPage {
    #[serde(default)]
    pub value: Vec<GenericResource>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

/// Body of a create-or-update request.
#[derive(Debug, Serialize)]
pub(crate) struct PutBody<'a> {
    pub properties: &'a Definition,
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
