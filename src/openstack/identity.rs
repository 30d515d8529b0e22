/// OpenStack identity (Keystone v3) token handling
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error_message;
use crate::config::IdentityConfig;
use crate::error::{Error, Result};

/// Header carrying the issued token in a Keystone response
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Tokens are renewed this long before they expire
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Source of auth tokens and service endpoints for remote calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a currently valid token, authenticating if needed
    async fn token(&self) -> Result<String>;

    /// Return the public endpoint for a service type, e.g. `compute`
    async fn endpoint(&self, service_type: &str) -> Result<String>;
}

/// A fixed, externally managed token
pub struct StaticToken {
    token: String,
    compute_url: Option<String>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>, compute_url: Option<String>) -> Self {
        Self {
            token: token.into(),
            compute_url,
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn endpoint(&self, service_type: &str) -> Result<String> {
        match (service_type, &self.compute_url) {
            ("compute", Some(url)) => Ok(url.clone()),
            _ => Err(Error::Config(format!(
                "no {} endpoint configured for a static token",
                service_type
            ))),
        }
    }
}

/// Token issued by Keystone together with its service catalog
#[derive(Debug, Clone)]
struct IssuedToken {
    id: String,
    expires_at: Option<DateTime<Utc>>,
    catalog: Vec<CatalogEntry>,
}

impl IssuedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) < expires_at,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// Service catalog entry
#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    url: String,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
}

/// Keystone v3 authentication with a cached, re-issued token
pub struct KeystoneAuth {
    client: Client,
    auth_url: String,
    identity: IdentityConfig,
    compute_url: Option<String>,
    cached: Mutex<Option<IssuedToken>>,
}

impl KeystoneAuth {
    /// Create a new Keystone authenticator. No request is sent until a token is needed.
    pub fn new(client: Client, identity: IdentityConfig, compute_url: Option<String>) -> Result<Self> {
        let auth_url = identity
            .auth_url
            .clone()
            .ok_or_else(|| Error::Config("identity auth_url not provided".to_string()))?;

        Ok(Self {
            client,
            auth_url,
            identity,
            compute_url,
            cached: Mutex::new(None),
        })
    }

    fn tokens_url(&self) -> String {
        let base = self.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            format!("{}/auth/tokens", base)
        } else {
            format!("{}/v3/auth/tokens", base)
        }
    }

    /// Return the cached token, authenticating when absent or about to expire
    async fn issued(&self) -> Result<IssuedToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.clone());
            }
            debug!("Identity token expires soon, re-authenticating");
        }

        let token = self.authenticate().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn authenticate(&self) -> Result<IssuedToken> {
        let url = self.tokens_url();
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&auth_request(&self.identity))
            .send()
            .await
            .map_err(|e| Error::remote("error during openstack authentication", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(
                "error during openstack authentication",
                error_message(status, &body),
            ));
        }

        let id = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::remote(
                    "error during openstack authentication",
                    format!("response carries no {} header", SUBJECT_TOKEN_HEADER),
                )
            })?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::remote("error parsing identity token", e.to_string()))?;

        info!(
            "Authenticated against {} (expires: {})",
            self.auth_url,
            body.token
                .expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );

        Ok(IssuedToken {
            id,
            expires_at: body.token.expires_at,
            catalog: body.token.catalog,
        })
    }
}

#[async_trait]
impl TokenProvider for KeystoneAuth {
    async fn token(&self) -> Result<String> {
        Ok(self.issued().await?.id)
    }

    async fn endpoint(&self, service_type: &str) -> Result<String> {
        if service_type == "compute" {
            if let Some(url) = &self.compute_url {
                return Ok(url.clone());
            }
        }

        let token = self.issued().await?;
        select_endpoint(&token.catalog, service_type, self.identity.region.as_deref())
    }
}

/// Pick the public endpoint of a service, honouring the region if one is set
fn select_endpoint(
    catalog: &[CatalogEntry],
    service_type: &str,
    region: Option<&str>,
) -> Result<String> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == service_type)
        .flat_map(|entry| entry.endpoints.iter())
        .filter(|ep| ep.interface == "public")
        .find(|ep| match region {
            Some(region) => {
                ep.region_id.as_deref() == Some(region) || ep.region.as_deref() == Some(region)
            }
            None => true,
        })
        .map(|ep| ep.url.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            Error::not_found(
                "service endpoint",
                service_type,
                format!(
                    "no public endpoint in the service catalog{}",
                    region.map(|r| format!(" for region {}", r)).unwrap_or_default()
                ),
            )
        })
}

/// Build the Keystone v3 `auth` request body
fn auth_request(identity: &IdentityConfig) -> Value {
    let identity_body = if identity.uses_application_credential() {
        let mut credential = json!({ "secret": identity.application_credential_secret });
        if let Some(id) = &identity.application_credential_id {
            credential["id"] = json!(id);
        } else {
            credential["name"] = json!(identity.application_credential_name);
            credential["user"] = user(identity);
        }
        json!({
            "methods": ["application_credential"],
            "application_credential": credential,
        })
    } else {
        let mut user = user(identity);
        user["password"] = json!(identity.password);
        json!({
            "methods": ["password"],
            "password": { "user": user },
        })
    };

    let mut auth = json!({ "identity": identity_body });

    // Application credentials carry their own scope.
    if !identity.uses_application_credential() {
        if let Some(scope) = scope(identity) {
            auth["scope"] = scope;
        }
    }

    json!({ "auth": auth })
}

fn user(identity: &IdentityConfig) -> Value {
    if let Some(id) = &identity.user_id {
        return json!({ "id": id });
    }
    let mut user = json!({ "name": identity.username });
    if let Some(domain) = domain(&identity.user_domain_id, &identity.user_domain_name) {
        user["domain"] = domain;
    }
    user
}

fn scope(identity: &IdentityConfig) -> Option<Value> {
    if identity.has_project_scope() {
        let mut project = match &identity.project_id {
            Some(id) => json!({ "id": id }),
            None => json!({ "name": identity.project_name }),
        };
        if identity.project_id.is_none() {
            if let Some(domain) = domain(&identity.project_domain_id, &identity.project_domain_name) {
                project["domain"] = domain;
            }
        }
        return Some(json!({ "project": project }));
    }

    domain(&identity.domain_id, &identity.domain_name).map(|domain| json!({ "domain": domain }))
}

fn domain(id: &Option<String>, name: &Option<String>) -> Option<Value> {
    match (id, name) {
        (Some(id), _) => Some(json!({ "id": id })),
        (None, Some(name)) => Some(json!({ "name": name })),
        (None, None) => None,
    }
}
