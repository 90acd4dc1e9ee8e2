//! Fully-qualified resource identifiers.
//!
//! Identifiers follow the hierarchical control-plane layout:
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{type}/{name}...]`.

use std::fmt;

use crate::error::ResourceError;

/// A parsed, fully-qualified resource identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: Option<String>,
    namespace: Option<String>,
    segments: Vec<(String, String)>,
}

impl ResourceId {
    /// Parses an identifier string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a subscription-rooted identifier
    /// or has a type segment without a name.
    pub fn parse(id: &str) -> Result<Self, ResourceError> {
        let invalid = |reason: &str| ResourceError::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = id.split('/').filter(|p| !p.is_empty());

        match parts.next() {
            Some(key) if key.eq_ignore_ascii_case("subscriptions") => {}
            _ => return Err(invalid("must start with /subscriptions")),
        }
        let subscription_id = parts
            .next()
            .ok_or_else(|| invalid("missing subscription id"))?
            .to_string();

        let mut parsed = Self {
            subscription_id,
            resource_group: None,
            namespace: None,
            segments: Vec::new(),
        };

        while let Some(key) = parts.next() {
            let value = parts
                .next()
                .ok_or_else(|| invalid(&format!("segment '{key}' has no value")))?;

            if parsed.segments.is_empty() && parsed.namespace.is_none() {
                if key.eq_ignore_ascii_case("resourceGroups") && parsed.resource_group.is_none() {
                    parsed.resource_group = Some(value.to_string());
                    continue;
                }
                if key.eq_ignore_ascii_case("providers") {
                    parsed.namespace = Some(value.to_string());
                    continue;
                }
            }

            parsed.segments.push((key.to_string(), value.to_string()));
        }

        Ok(parsed)
    }

    /// Builds the identifier of a resource group scope.
    #[must_use]
    pub fn resource_group_scope(subscription_id: &str, resource_group: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: Some(resource_group.to_string()),
            namespace: None,
            segments: Vec::new(),
        }
    }

    /// Builds the identifier of a top-level resource inside a resource group.
    #[must_use]
    pub fn top_level(
        subscription_id: &str,
        resource_group: &str,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: Some(resource_group.to_string()),
            namespace: Some(namespace.to_string()),
            segments: vec![(kind.to_string(), name.to_string())],
        }
    }

    /// Returns the identifier of a child resource of this one.
    #[must_use]
    pub fn child(&self, kind: &str, name: &str) -> Self {
        let mut child = self.clone();
        child.segments.push((kind.to_string(), name.to_string()));
        child
    }

    /// Returns the same identifier relocated to another resource group.
    #[must_use]
    pub fn with_resource_group(&self, resource_group: &str) -> Self {
        let mut moved = self.clone();
        moved.resource_group = Some(resource_group.to_string());
        moved
    }

    /// Subscription the resource lives in.
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Resource group name, if the identifier is resource-group scoped.
    #[must_use]
    pub fn resource_group_name(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    /// Provider namespace, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Name of the innermost resource.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|(_, name)| name.as_str())
    }

    /// Type of the innermost resource.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.segments.last().map(|(kind, _)| kind.as_str())
    }

    /// Returns the identifier of the enclosing resource, if there is one.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;
        if let Some(rg) = &self.resource_group {
            write!(f, "/resourceGroups/{rg}")?;
        }
        if let Some(ns) = &self.namespace {
            write!(f, "/providers/{ns}")?;
        }
        for (kind, name) in &self.segments {
            write!(f, "/{kind}/{name}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ResourceId {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
