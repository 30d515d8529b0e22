/// Machine termination through the OpenStack compute API
use reqwest::{header, Client};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::error_message;
use super::identity::TokenProvider;
use crate::error::{Error, Result};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Compute server as returned by the servers listing
#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ServerListResponse {
    servers: Vec<Server>,
    #[serde(default)]
    servers_links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

impl ServerListResponse {
    /// URL of the following page, absent on the last one
    fn next_page(&self) -> Option<&str> {
        self.servers_links
            .iter()
            .find(|link| link.rel == "next")
            .map(|link| link.href.as_str())
    }
}

/// Client for the compute (Nova) servers API
#[derive(Clone)]
pub struct ComputeClient {
    client: Client,
    auth: Arc<dyn TokenProvider>,
}

impl ComputeClient {
    /// Create a new compute client
    pub fn new(client: Client, auth: Arc<dyn TokenProvider>) -> Self {
        Self { client, auth }
    }

    async fn base_url(&self) -> Result<String> {
        Ok(self
            .auth
            .endpoint("compute")
            .await?
            .trim_end_matches('/')
            .to_string())
    }

    /// List servers whose name matches exactly, across all result pages
    pub async fn find_servers(&self, name: &str) -> Result<Vec<Server>> {
        let context = format!("error listing servers named {}", name);
        let first = format!("{}/servers", self.base_url().await?);

        let mut servers = Vec::new();
        let mut page = self.list_page(&first, Some(name), &context).await?;
        loop {
            let next = page.next_page().map(str::to_string);
            servers.extend(exact_matches(page.servers, name));

            match next {
                Some(url) => page = self.list_page(&url, None, &context).await?,
                None => break,
            }
        }

        Ok(servers)
    }

    /// Fetch one page of the servers listing. Pages after the first carry
    /// their query in the `next` link.
    async fn list_page(&self, url: &str, name: Option<&str>, context: &str) -> Result<ServerListResponse> {
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(name) = name {
            request = request.query(&[("name", name)]);
        }

        let response = request
            .header(AUTH_TOKEN_HEADER, self.auth.token().await?)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::remote(context, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(context, error_message(status, &body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::remote(context, e.to_string()))
    }

    /// Delete a server by ID
    pub async fn delete_server(&self, server_id: &str) -> Result<()> {
        let url = format!("{}/servers/{}", self.base_url().await?, server_id);
        debug!("DELETE {}", url);

        let context = format!("error deleting server {}", server_id);
        let response = self
            .client
            .delete(&url)
            .header(AUTH_TOKEN_HEADER, self.auth.token().await?)
            .send()
            .await
            .map_err(|e| Error::remote(&context, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::remote(context, error_message(status, &body)))
        }
    }

    /// Terminate the single server carrying `name`
    ///
    /// Zero or several servers with that name is an error; the name is not
    /// disambiguated any further.
    pub async fn delete_server_by_name(&self, name: &str) -> Result<()> {
        let servers = self.find_servers(name).await?;
        let server = single_server(servers, name)?;

        info!("Deleting server {} (ID: {})", server.name, server.id);
        self.delete_server(&server.id).await
    }
}

/// The servers API filters by regular expression, keep only exact names
fn exact_matches(servers: Vec<Server>, name: &str) -> Vec<Server> {
    servers.into_iter().filter(|s| s.name == name).collect()
}

fn single_server(mut servers: Vec<Server>, name: &str) -> Result<Server> {
    match servers.len() {
        0 => Err(Error::not_found("server", name, "no server found with that name")),
        1 => Ok(servers.remove(0)),
        n => Err(Error::not_found(
            "server",
            name,
            format!("{} servers found with that name", n),
        )),
    }
}
