//! JSON/REST control-plane client.
//!
//! One [`RestClient`] serves one resource kind under one parent; modules
//! receive it as their [`RemoteClient`].

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{CloudholdError, RemoteError, Result};
use crate::resource::{Definition, Parent, RemoteClient, RemoteResult};

use super::context::CloudContext;
use super::types::{ErrorEnvelope, GenericResource, ListPage, PutBody};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Upper bound on followed `nextLink` pages.
const MAX_PAGES: usize = 100;

/// Client for one resource kind of a JSON control plane.
#[derive(Debug, Clone)]
pub struct RestClient {
    /// HTTP client.
    http: Client,
    /// Endpoint and credentials.
    context: CloudContext,
    /// Scope the kind lives under.
    parent: Parent,
    /// Collection segment, e.g. `firewallRules`.
    kind: String,
    /// Retries for rate limiting and network failures.
    max_retries: u32,
}

impl RestClient {
    /// Creates a client for `kind` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(context: CloudContext, parent: Parent, kind: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| CloudholdError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            context,
            parent,
            kind: kind.into(),
            max_retries: MAX_RETRIES,
        })
    }

    /// Sets the number of retries for transient failures.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Scope this client lists and creates under.
    #[must_use]
    pub const fn parent(&self) -> &Parent {
        &self.parent
    }

    /// Resource kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Executes a request with retries on rate limiting and network errors.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&PutBody<'_>>,
    ) -> RemoteResult<(StatusCode, String)> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {}", self.max_retries);
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self.execute_once(method.clone(), path, body).await {
                Ok(reply) => return Ok(reply),
                Err(e @ (RemoteError::RateLimited { .. } | RemoteError::NetworkError { .. })) => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| RemoteError::network("Max retries exceeded")))
    }

    /// Executes a single request and maps the status.
    async fn execute_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&PutBody<'_>>,
    ) -> RemoteResult<(StatusCode, String)> {
        let url = self.context.url(path);
        trace!("{method} {url}");

        let mut request = self
            .http
            .request(method, &url)
            .header(header::ACCEPT, "application/json");
        if !url.contains("api-version=") {
            request = request.query(&[("api-version", self.context.api_version())]);
        }
        if let Some(token) = self.context.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(RemoteError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::AuthenticationFailed {
                message: format!("{status} for {path}"),
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound {
                resource: path.to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(RemoteError::api_error(status.as_u16(), error_message(&text)));
        }

        Ok((status, text))
    }

    async fn fetch(&self, path: &str) -> RemoteResult<Option<GenericResource>> {
        match self.execute(Method::GET, path, None).await {
            Ok((_, text)) => parse_resource(&text).map(Some),
            Err(RemoteError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RemoteClient for RestClient {
    type Remote = GenericResource;

    async fn get(&self, name: &str, resource_group: &str) -> RemoteResult<Option<GenericResource>> {
        let path = self.parent.child_id(&self.kind, resource_group, name);
        self.fetch(&path).await
    }

    async fn list_by_parent(&self, parent: &Parent) -> RemoteResult<Vec<GenericResource>> {
        let mut next = Some(parent.collection_path(&self.kind));
        let mut resources = Vec::new();
        let mut pages = 0;

        while let Some(path) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(RemoteError::invalid_response(format!(
                    "listing {} exceeded {MAX_PAGES} pages",
                    self.kind
                )));
            }

            let (_, text) = self.execute(Method::GET, &path, None).await?;
            let page: ListPage = serde_json::from_str(&text)
                .map_err(|e| RemoteError::invalid_response(format!("Failed to parse listing: {e}")))?;

            resources.extend(page.value.into_iter().map(GenericResource::normalized));
            next = page.next_link.filter(|link| !link.is_empty());
        }

        debug!("Listed {} {} under {}", resources.len(), self.kind, parent.id());
        Ok(resources)
    }

    async fn create_or_update(
        &self,
        parent: &Parent,
        resource_group: &str,
        name: &str,
        definition: &Definition,
    ) -> RemoteResult<GenericResource> {
        let path = parent.child_id(&self.kind, resource_group, name);
        let body = PutBody {
            properties: definition,
        };

        let (status, text) = self.execute(Method::PUT, &path, Some(&body)).await?;

        if status == StatusCode::ACCEPTED || text.trim().is_empty() {
            debug!("Write to {path} accepted asynchronously, reading back");
            return self.fetch(&path).await?.ok_or_else(|| {
                RemoteError::invalid_response(format!("{path} missing after accepted write"))
            });
        }

        parse_resource(&text)
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        self.execute(Method::DELETE, id, None).await.map(|_| ())
    }

    async fn restart(&self, id: &str) -> RemoteResult<()> {
        let path = format!("{}/restart", id.trim_end_matches('/'));
        self.execute(Method::POST, &path, None).await.map(|_| ())
    }
}

fn parse_resource(text: &str) -> RemoteResult<GenericResource> {
    serde_json::from_str::<GenericResource>(text)
        .map(GenericResource::normalized)
        .map_err(|e| RemoteError::invalid_response(format!("Failed to parse resource: {e}")))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| body.to_string(),
        |envelope| format!("{}: {}", envelope.error.code, envelope.error.message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ParentRef, RemoteResource, ResourceModule, ResourceStatus};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SERVER_ID: &str =
        "/subscriptions/s/resourceGroups/rg-db/providers/Microsoft.DBforPostgreSQL/servers/pg-1";

    fn server_parent() -> Parent {
        Parent::Resource(ParentRef {
            id: SERVER_ID.to_string(),
            name: String::from("pg-1"),
            resource_group: String::from("rg-db"),
        })
    }

    fn rule(name: &str, ip: &str) -> serde_json::Value {
        json!({
            "id": format!("{SERVER_ID}/firewallRules/{name}"),
            "name": name,
            "type": "Microsoft.DBforPostgreSQL/servers/firewallRules",
            "properties": { "startIpAddress": ip, "endIpAddress": ip }
        })
    }

    fn client(server: &MockServer) -> RestClient {
        let context = CloudContext::new(server.uri(), "s", "2023-01-01").with_token("t0k");
        RestClient::new(context, server_parent(), "firewallRules")
            .unwrap()
            .with_max_retries(0)
    }

    #[tokio::test]
    async fn test_get_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{SERVER_ID}/firewallRules/office")))
            .and(query_param("api-version", "2023-01-01"))
            .and(header_is("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rule("office", "10.0.0.1")))
            .mount(&server)
            .await;

        let found = client(&server).get("office", "rg-db").await.unwrap().unwrap();

        assert_eq!(found.name(), "office");
        assert_eq!(found.resource_group(), "rg-db");
        assert_eq!(found.definition()["startIpAddress"], "10.0.0.1");
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).get("ghost", "rg-db").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{SERVER_ID}/firewallRules/locked")))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{SERVER_ID}/firewallRules/busy")))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{SERVER_ID}/firewallRules/broken")))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": "InternalServerError", "message": "try later" }
            })))
            .mount(&server)
            .await;
        let client = client(&server);

        assert!(matches!(
            client.get("locked", "rg-db").await,
            Err(RemoteError::AuthenticationFailed { .. })
        ));
        assert!(matches!(
            client.get("busy", "rg-db").await,
            Err(RemoteError::RateLimited { retry_after_secs: 7 })
        ));
        match client.get("broken", "rg-db").await {
            Err(RemoteError::ApiRequestFailed { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "InternalServerError: try later");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let server = MockServer::start().await;
        let second = format!("{}/page2?api-version=2023-01-01", server.uri());
        Mock::given(method("GET"))
            .and(path(format!("{SERVER_ID}/firewallRules")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [rule("a", "10.0.0.1")],
                "nextLink": second
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [rule("b", "10.0.0.2")]
            })))
            .mount(&server)
            .await;

        let listed = client(&server).list_by_parent(&server_parent()).await.unwrap();

        let names: Vec<_> = listed.iter().map(RemoteResource::name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_put_sends_properties() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{SERVER_ID}/firewallRules/office")))
            .and(body_json(json!({
                "properties": { "startIpAddress": "1.2.3.4", "endIpAddress": "1.2.3.4" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(rule("office", "1.2.3.4")))
            .expect(1)
            .mount(&server)
            .await;

        let mut definition = Definition::new();
        definition.insert(String::from("startIpAddress"), json!("1.2.3.4"));
        definition.insert(String::from("endIpAddress"), json!("1.2.3.4"));

        let created = client(&server)
            .create_or_update(&server_parent(), "rg-db", "office", &definition)
            .await
            .unwrap();

        assert_eq!(created.definition(), definition);
    }

    #[tokio::test]
    async fn test_accepted_put_reads_back() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rule("office", "1.2.3.4")))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server)
            .create_or_update(&server_parent(), "rg-db", "office", &Definition::new())
            .await
            .unwrap();

        assert_eq!(created.name(), "office");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(&server)
            .delete(&format!("{SERVER_ID}/firewallRules/ghost"))
            .await;

        assert!(matches!(result, Err(RemoteError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_module_over_rest_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{SERVER_ID}/firewallRules")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [rule("office", "10.0.0.1"), rule("home", "10.0.0.2")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{SERVER_ID}/firewallRules/home")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let module = ResourceModule::new("firewallRules", server_parent(), Arc::new(client(&server)));
        let listed = module.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        module.delete("home", "").await.unwrap();
        let home = module.get("home", "rg-db").await.unwrap();
        assert_eq!(home.status().await, ResourceStatus::NotExist);
    }

    #[tokio::test]
    async fn test_restart_posts_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{SERVER_ID}/restart")))
            .and(query_param("api-version", "2023-01-01"))
            .and(header_is("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).restart(SERVER_ID).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_restart_conflict_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": { "code": "ServerBusy", "message": "operation in progress" }
            })))
            .mount(&server)
            .await;

        let result = client(&server).restart(SERVER_ID).await;

        assert!(matches!(
            result,
            Err(RemoteError::ApiRequestFailed { status: 409, .. })
        ));
    }
}
