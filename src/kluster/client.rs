/// Cluster-management API client
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::models::*;
use crate::error::{Error, Result};
use crate::openstack::{error_message, TokenProvider};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Client for the cluster-management API
#[derive(Clone)]
pub struct KlusterClient {
    client: Client,
    base_url: String,
    auth: Arc<dyn TokenProvider>,
}

impl KlusterClient {
    /// Create a new cluster API client
    pub fn new(client: Client, url: &str, auth: Arc<dyn TokenProvider>) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::Config(format!("error parsing url {}: {}", url, e)))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, endpoint)
    }

    /// Make a GET request to the API
    async fn get<T: DeserializeOwned>(&self, endpoint: &str, context: &str) -> Result<T> {
        let url = self.url(endpoint);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(AUTH_TOKEN_HEADER, self.auth.token().await?)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::remote(context, e.to_string()))?;

        handle_response(response, context).await
    }

    /// Make a PUT request to the API
    async fn put<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
        context: &str,
    ) -> Result<R> {
        let url = self.url(endpoint);
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .header(AUTH_TOKEN_HEADER, self.auth.token().await?)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::remote(context, e.to_string()))?;

        handle_response(response, context).await
    }

    /// Get a cluster by name
    pub async fn show_cluster(&self, cluster_name: &str) -> Result<Kluster> {
        self.get(
            &format!("clusters/{}", cluster_name),
            &format!("error getting cluster {}", cluster_name),
        )
        .await
    }

    /// Replace a cluster's full specification
    pub async fn update_cluster(&self, kluster: &Kluster) -> Result<Kluster> {
        self.put(
            &format!("clusters/{}", kluster.name),
            kluster,
            &format!("error updating cluster {}", kluster.name),
        )
        .await
    }

    /// Get the OpenStack metadata of the project
    pub async fn openstack_metadata(&self) -> Result<OpenstackMetadata> {
        self.get("openstack/metadata", "error getting openstack metadata")
            .await
    }
}

/// Handle API response, checking for errors
async fn handle_response<T: DeserializeOwned>(response: Response, context: &str) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::remote(context, e.to_string()))?;

    if status.is_success() {
        serde_json::from_str(&body)
            .map_err(|e| Error::remote(context, format!("failed to parse API response: {}", e)))
    } else {
        Err(Error::remote(context, api_error_message(status, &body)))
    }
}

/// Prefer the API's own `{code, message}` error body
fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => error.message,
        Err(_) => error_message(status, body),
    }
}
