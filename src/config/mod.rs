/// Configuration management for the node pool adapter
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use url::Url;

use crate::error::{Error, Result};

/// Main adapter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name of the managed cluster (all remote calls are scoped to it)
    #[serde(default)]
    pub cluster_name: String,

    /// Base URL of the cluster-management API
    #[serde(default)]
    pub url: String,

    /// Compute API endpoint. Taken from the identity service catalog if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_url: Option<String>,

    /// OpenStack identity credentials
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// OpenStack identity configuration
///
/// Every field can also be supplied through the matching `OS_*` variable.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_domain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_domain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_credential_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_credential_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_credential_secret: Option<String>,

    /// Pre-issued token; skips password authentication when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Region used to pick endpoints from the service catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("auth_url", &self.auth_url)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("user_domain_id", &self.user_domain_id)
            .field("user_domain_name", &self.user_domain_name)
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .field("project_domain_id", &self.project_domain_id)
            .field("project_domain_name", &self.project_domain_name)
            .field("domain_id", &self.domain_id)
            .field("domain_name", &self.domain_name)
            .field("application_credential_id", &self.application_credential_id)
            .field("application_credential_name", &self.application_credential_name)
            .field(
                "application_credential_secret",
                &redacted(&self.application_credential_secret),
            )
            .field("token", &redacted(&self.token))
            .field("region", &self.region)
            .finish()
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl IdentityConfig {
    /// Whether a project scope was requested
    pub fn has_project_scope(&self) -> bool {
        self.project_id.is_some()
            || self.project_name.is_some()
            || self.project_domain_id.is_some()
            || self.project_domain_name.is_some()
    }

    /// Whether application credentials are configured
    pub fn uses_application_credential(&self) -> bool {
        self.application_credential_secret.is_some()
            && (self.application_credential_id.is_some()
                || self.application_credential_name.is_some())
    }

    fn fill_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&mut Option<String>, &str); 17] = [
            (&mut self.auth_url, "OS_AUTH_URL"),
            (&mut self.user_id, "OS_USER_ID"),
            (&mut self.username, "OS_USERNAME"),
            (&mut self.password, "OS_PASSWORD"),
            (&mut self.user_domain_id, "OS_USER_DOMAIN_ID"),
            (&mut self.user_domain_name, "OS_USER_DOMAIN_NAME"),
            (&mut self.project_id, "OS_PROJECT_ID"),
            (&mut self.project_name, "OS_PROJECT_NAME"),
            (&mut self.project_domain_id, "OS_PROJECT_DOMAIN_ID"),
            (&mut self.project_domain_name, "OS_PROJECT_DOMAIN_NAME"),
            (&mut self.domain_id, "OS_DOMAIN_ID"),
            (&mut self.domain_name, "OS_DOMAIN_NAME"),
            (&mut self.application_credential_id, "OS_APPLICATION_CREDENTIAL_ID"),
            (&mut self.application_credential_name, "OS_APPLICATION_CREDENTIAL_NAME"),
            (&mut self.application_credential_secret, "OS_APPLICATION_CREDENTIAL_SECRET"),
            (&mut self.token, "OS_AUTH_TOKEN"),
            (&mut self.region, "OS_REGION_NAME"),
        ];

        for (field, name) in fields {
            if field.is_none() {
                *field = var(name);
            }
        }
    }
}

impl Config {
    /// Load configuration from a YAML (or JSON) file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Build configuration purely from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.fill_from(env_var);
        config
    }

    /// Load the optional file, fill the gaps from the environment and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.fill_from(env_var);
        config.validate()?;
        Ok(config)
    }

    fn fill_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.cluster_name.is_empty() {
            self.cluster_name = var("CLUSTER_NAME").unwrap_or_default();
        }
        if self.url.is_empty() {
            self.url = var("KUBERNIKUS_URL")
                .or_else(|| var("CLUSTER_API_URL"))
                .unwrap_or_default();
        }
        if self.compute_url.is_none() {
            self.compute_url = var("COMPUTE_URL");
        }
        self.identity.fill_from(var);
    }

    /// Validate the configuration without touching the network
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.is_empty() {
            return Err(Error::Config("cluster_name not provided".to_string()));
        }

        if self.url.is_empty() {
            return Err(Error::Config("url not provided".to_string()));
        }
        parse_url("url", &self.url)?;

        if let Some(compute_url) = &self.compute_url {
            parse_url("compute_url", compute_url)?;
        }

        let identity = &self.identity;
        if identity.token.is_some() {
            // a bare token comes without a service catalog
            if self.compute_url.is_none() {
                return Err(Error::Config(
                    "compute_url is required when authenticating with a token".to_string(),
                ));
            }
            return Ok(());
        }

        let auth_url = identity.auth_url.as_deref().ok_or_else(|| {
            Error::Config("neither a token nor an identity auth_url provided".to_string())
        })?;
        parse_url("auth_url", auth_url)?;

        let has_password = identity.password.is_some()
            && (identity.user_id.is_some() || identity.username.is_some());
        if !has_password && !identity.uses_application_credential() {
            return Err(Error::Config(
                "identity needs a user and password or an application credential".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            cluster_name: "demo".to_string(),
            url: "https://kubernikus.example.com".to_string(),
            compute_url: None,
            identity: IdentityConfig {
                auth_url: Some("https://identity.example.com/v3".to_string()),
                username: Some("autoscaler".to_string()),
                user_domain_name: Some("Default".to_string()),
                project_name: Some("demo-project".to_string()),
                project_domain_name: Some("Default".to_string()),
                region: Some("eu-de-1".to_string()),
                ..IdentityConfig::default()
            },
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Config(format!("{} {:?} is not a valid URL: {}", field, value, e)))
}
