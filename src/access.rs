//! Firewall access toggles for database servers.
//!
//! Built on a firewall-rule [`ResourceModule`] owned by the server. Both
//! toggles are idempotent: enabling an enabled rule or disabling a missing
//! one makes no mutation.

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::resource::{RemoteClient, ResourceModule};

/// Rule that lets the cloud provider's own services reach the server.
pub const SERVICE_ACCESS_RULE_NAME: &str = "AllowAllWindowsAzureIps";

/// Address range marker for provider-service access.
pub const SERVICE_ACCESS_IP: &str = "0.0.0.0";

/// Rule attribute holding the first allowed address.
pub const START_IP_FIELD: &str = "startIpAddress";

/// Rule attribute holding the last allowed address.
pub const END_IP_FIELD: &str = "endIpAddress";

/// Prefix of the per-machine rule name.
const LOCAL_RULE_PREFIX: &str = "ClientIPAddress_";

/// Name of the rule granting this machine access, derived from its hostname.
#[must_use]
pub fn local_machine_rule_name() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    rule_name_for_host(&host)
}

/// Rule name for `host`, keeping only characters rule names accept.
#[must_use]
pub fn rule_name_for_host(host: &str) -> String {
    let sanitized: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let sanitized = sanitized.trim_matches('-');
    if sanitized.is_empty() {
        format!("{LOCAL_RULE_PREFIX}localhost")
    } else {
        format!("{LOCAL_RULE_PREFIX}{sanitized}")
    }
}

/// Whether provider services may reach the server.
///
/// # Errors
///
/// Returns a transport error if the rule could not be loaded.
pub async fn is_service_access_allowed<C: RemoteClient>(rules: &ResourceModule<C>) -> Result<bool> {
    rules.exists(SERVICE_ACCESS_RULE_NAME, "").await
}

/// Whether this machine may reach the server.
///
/// # Errors
///
/// Returns a transport error if the rule could not be loaded.
pub async fn is_local_machine_access_allowed<C: RemoteClient>(
    rules: &ResourceModule<C>,
) -> Result<bool> {
    rules.exists(&local_machine_rule_name(), "").await
}

/// Adds or removes the provider-service rule.
///
/// # Errors
///
/// Returns a transport error if a remote call fails.
pub async fn toggle_service_access<C: RemoteClient>(
    rules: &ResourceModule<C>,
    allowed: bool,
) -> Result<()> {
    toggle(rules, SERVICE_ACCESS_RULE_NAME, allowed, Some(SERVICE_ACCESS_IP), false).await
}

/// Adds or removes the rule for this machine.
///
/// `public_ip` is this machine's address as seen by the server; it is only
/// needed when enabling access.
///
/// # Errors
///
/// Returns a validation error if access is enabled without a usable IP, or
/// a transport error if a remote call fails.
pub async fn toggle_local_machine_access<C: RemoteClient>(
    rules: &ResourceModule<C>,
    allowed: bool,
    public_ip: Option<&str>,
) -> Result<()> {
    toggle_named_access(rules, &local_machine_rule_name(), allowed, public_ip).await
}

/// Adds or removes a single-address rule called `rule_name`.
///
/// # Errors
///
/// As [`toggle_local_machine_access`].
pub async fn toggle_named_access<C: RemoteClient>(
    rules: &ResourceModule<C>,
    rule_name: &str,
    allowed: bool,
    public_ip: Option<&str>,
) -> Result<()> {
    toggle(rules, rule_name, allowed, public_ip, true).await
}

async fn toggle<C: RemoteClient>(
    rules: &ResourceModule<C>,
    rule_name: &str,
    allowed: bool,
    ip: Option<&str>,
    upsert: bool,
) -> Result<()> {
    let exists = rules.exists(rule_name, "").await?;

    match (allowed, exists) {
        (false, true) => rules.delete(rule_name, "").await,
        (true, false) => {
            let ip = ip.map(str::trim).filter(|ip| !ip.is_empty()).ok_or_else(|| {
                ConfigError::validation(
                    format!("cannot enable rule '{rule_name}': public IP address is unknown"),
                    "public_ip",
                )
            })?;

            let mut draft = if upsert {
                rules.update_or_create(rule_name, "").await
            } else {
                rules.create(rule_name, "").await
            };
            draft.set(START_IP_FIELD, ip)?.set(END_IP_FIELD, ip)?;
            draft.commit().await?;
            Ok(())
        }
        _ => {
            debug!("Rule '{rule_name}' already {}", if allowed { "present" } else { "absent" });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudholdError;
    use crate::resource::testing::{StubClient, server_parent};
    use serde_json::json;
    use std::sync::Arc;

    fn module(client: &Arc<StubClient>) -> ResourceModule<StubClient> {
        ResourceModule::new("firewallRules", server_parent(), Arc::clone(client))
    }

    #[test]
    fn test_rule_name_sanitized() {
        assert_eq!(rule_name_for_host("dev-box.corp.local"), "ClientIPAddress_dev-box-corp-local");
        assert_eq!(rule_name_for_host(""), "ClientIPAddress_localhost");
        assert!(local_machine_rule_name().starts_with("ClientIPAddress_"));
    }

    #[tokio::test]
    async fn test_enable_service_access() {
        let client = Arc::new(StubClient::new());
        let rules = module(&client);

        toggle_service_access(&rules, true).await.unwrap();

        let definition = client.definition_of("rg-db", SERVICE_ACCESS_RULE_NAME).unwrap();
        assert_eq!(definition[START_IP_FIELD], json!("0.0.0.0"));
        assert_eq!(definition[END_IP_FIELD], json!("0.0.0.0"));
        assert!(is_service_access_allowed(&rules).await.unwrap());
    }

    #[tokio::test]
    async fn test_toggles_are_idempotent() {
        let client = Arc::new(StubClient::new());
        let rules = module(&client);

        toggle_service_access(&rules, true).await.unwrap();
        toggle_service_access(&rules, true).await.unwrap();
        assert_eq!(client.create_calls(), 1);

        toggle_service_access(&rules, false).await.unwrap();
        toggle_service_access(&rules, false).await.unwrap();
        assert_eq!(client.delete_calls(), 1);
        assert!(!client.contains("rg-db", SERVICE_ACCESS_RULE_NAME));
        assert!(!is_service_access_allowed(&rules).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_access_requires_ip() {
        let client = Arc::new(StubClient::new());
        let rules = module(&client);

        let err = toggle_local_machine_access(&rules, true, Some("  ")).await.unwrap_err();

        assert!(matches!(err, CloudholdError::Config(ConfigError::ValidationError { .. })));
        assert_eq!(client.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_local_access_round_trip() {
        let client = Arc::new(StubClient::new());
        let rules = module(&client);
        let name = local_machine_rule_name();

        toggle_local_machine_access(&rules, true, Some("203.0.113.7")).await.unwrap();
        assert!(is_local_machine_access_allowed(&rules).await.unwrap());
        assert_eq!(
            client.definition_of("rg-db", &name).unwrap()[START_IP_FIELD],
            json!("203.0.113.7")
        );

        toggle_local_machine_access(&rules, false, None).await.unwrap();
        assert!(!client.contains("rg-db", &name));
    }

    #[tokio::test]
    async fn test_existing_rule_discovered_remotely() {
        let client = Arc::new(StubClient::new());
        client.seed(
            "rg-db",
            SERVICE_ACCESS_RULE_NAME,
            json!({ "startIpAddress": "0.0.0.0", "endIpAddress": "0.0.0.0" }),
        );
        let rules = module(&client);

        toggle_service_access(&rules, true).await.unwrap();

        assert_eq!(client.create_calls(), 0);
        assert_eq!(client.get_calls(), 1);
    }
}
