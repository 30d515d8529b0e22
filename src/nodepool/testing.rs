/// In-memory stand-ins for the remote node pool API
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use super::client::{apply_update, find_node_pool, NodePoolClient, RemotePoolClient, UpdateNodePoolOpts};
use crate::error::{Error, Result};
use crate::kluster::{KlusterClient, NodePool};
use crate::openstack::{ComputeClient, StaticToken};

pub const TEST_TOKEN: &str = "test-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Update {
        cluster: String,
        pool: String,
        target_size: Option<i64>,
    },
    DeleteNode {
        cluster: String,
        pool: String,
        node: String,
    },
    MachineTypes,
}

impl Call {
    pub fn update(cluster: &str, pool: &str, target_size: i64) -> Self {
        Call::Update {
            cluster: cluster.to_string(),
            pool: pool.to_string(),
            target_size: Some(target_size),
        }
    }

    pub fn delete(cluster: &str, pool: &str, node: &str) -> Self {
        Call::DeleteNode {
            cluster: cluster.to_string(),
            pool: pool.to_string(),
            node: node.to_string(),
        }
    }
}

/// Records every call and serves scripted node pools
#[derive(Default)]
pub struct FakePoolClient {
    pools: Mutex<Vec<NodePool>>,
    calls: Mutex<Vec<Call>>,
    list_error: Mutex<Option<String>>,
    update_error: Mutex<Option<String>>,
    failing_nodes: Mutex<HashSet<String>>,
}

impl FakePoolClient {
    pub fn with_pools(pools: Vec<NodePool>) -> Self {
        Self {
            pools: Mutex::new(pools),
            ..Self::default()
        }
    }

    pub fn set_pools(&self, pools: Vec<NodePool>) {
        *self.pools.lock().unwrap() = pools;
    }

    pub fn fail_lists(&self, message: &str) {
        *self.list_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_updates(&self, message: &str) {
        *self.update_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make deleting this node fail as an ambiguous machine name would
    pub fn fail_node(&self, node: &str) {
        self.failing_nodes.lock().unwrap().insert(node.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NodePoolClient for FakePoolClient {
    async fn list_node_pools(&self, cluster_name: &str) -> Result<Vec<NodePool>> {
        self.record(Call::List(cluster_name.to_string()));
        if let Some(message) = self.list_error.lock().unwrap().clone() {
            return Err(Error::remote(format!("error getting cluster {}", cluster_name), message));
        }
        Ok(self.pools.lock().unwrap().clone())
    }

    async fn update_node_pool(
        &self,
        cluster_name: &str,
        node_pool_name: &str,
        opts: UpdateNodePoolOpts,
    ) -> Result<NodePool> {
        self.record(Call::Update {
            cluster: cluster_name.to_string(),
            pool: node_pool_name.to_string(),
            target_size: opts.target_size,
        });
        if let Some(message) = self.update_error.lock().unwrap().clone() {
            return Err(Error::remote(format!("error updating cluster {}", cluster_name), message));
        }

        let mut pools = self.pools.lock().unwrap();
        find_node_pool(&pools, node_pool_name)?;
        let updated: Vec<_> = pools
            .drain(..)
            .map(|pool| apply_update(pool, node_pool_name, opts))
            .collect();
        *pools = updated;
        find_node_pool(&pools, node_pool_name)
    }

    async fn delete_node(
        &self,
        cluster_name: &str,
        node_pool_name: &str,
        node_name: &str,
    ) -> Result<NodePool> {
        self.record(Call::delete(cluster_name, node_pool_name, node_name));
        if self.failing_nodes.lock().unwrap().contains(node_name) {
            return Err(Error::not_found(
                "server",
                node_name,
                "2 servers found with that name",
            ));
        }

        let mut pools = self.pools.lock().unwrap();
        for pool in pools.iter_mut().filter(|p| p.name == node_pool_name) {
            pool.size = (pool.size - 1).max(0);
        }
        find_node_pool(&pools, node_pool_name)
    }

    async fn get_available_machine_types(&self) -> Result<Vec<String>> {
        self.record(Call::MachineTypes);
        Ok(vec!["m1.small".to_string(), "m1.large".to_string()])
    }
}

/// Request as seen by [`MockApi`]
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub token: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct MockState {
    base_url: String,
    kluster: Value,
    concurrent_write: Option<Value>,
    error: Option<(StatusCode, Value)>,
    servers: Vec<(String, String)>,
    page_size: Option<usize>,
    requests: Vec<Request>,
}

impl MockState {
    fn record(&mut self, method: &'static str, path: String, headers: &HeaderMap, body: Option<Value>) {
        self.requests.push(Request {
            method,
            path,
            token: headers
                .get("X-Auth-Token")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });
    }
}

type Shared = Arc<Mutex<MockState>>;

/// Cluster-management and compute APIs served over local HTTP
pub struct MockApi {
    state: Shared,
    url: String,
}

impl MockApi {
    /// Serve `kluster` as the only cluster on a random local port
    pub async fn start(kluster: Value) -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            kluster,
            ..MockState::default()
        }));

        let router = Router::new()
            .route("/api/v1/clusters/{name}", get(show_cluster).put(update_cluster))
            .route("/api/v1/openstack/metadata", get(openstack_metadata))
            .route("/compute/servers", get(list_servers))
            .route("/compute/servers/{id}", delete(delete_server))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        state.lock().unwrap().base_url = url.clone();

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { state, url }
    }

    /// Client wired to this server with a static token
    pub fn remote_client(&self) -> RemotePoolClient {
        let http = reqwest::Client::new();
        let kluster = KlusterClient::new(http, &self.url, Arc::new(self.token())).unwrap();
        RemotePoolClient::new(kluster, self.compute_client())
    }

    pub fn compute_client(&self) -> ComputeClient {
        ComputeClient::new(reqwest::Client::new(), Arc::new(self.token()))
    }

    fn token(&self) -> StaticToken {
        StaticToken::new(TEST_TOKEN, Some(format!("{}/compute", self.url)))
    }

    /// Cluster as currently stored on the server
    pub fn kluster(&self) -> Value {
        self.state.lock().unwrap().kluster.clone()
    }

    /// Replace the stored cluster right after the next GET has been answered
    pub fn concurrent_write(&self, kluster: Value) {
        self.state.lock().unwrap().concurrent_write = Some(kluster);
    }

    /// Answer every cluster API call with this error
    pub fn fail_with(&self, status: u16, body: Value) {
        self.state.lock().unwrap().error = Some((StatusCode::from_u16(status).unwrap(), body));
    }

    pub fn add_server(&self, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .servers
            .push((id.to_string(), name.to_string()));
    }

    pub fn page_size(&self, size: usize) {
        self.state.lock().unwrap().page_size = Some(size);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.requests().iter().map(|r| r.method).collect()
    }
}

async fn show_cluster(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    state.record("GET", format!("/api/v1/clusters/{}", name), &headers, None);
    if let Some((status, body)) = state.error.clone() {
        return (status, Json(body)).into_response();
    }

    let current = state.kluster.clone();
    if let Some(newer) = state.concurrent_write.take() {
        state.kluster = newer;
    }
    Json(current).into_response()
}

async fn update_cluster(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.record("PUT", format!("/api/v1/clusters/{}", name), &headers, Some(body.clone()));
    if let Some((status, error)) = state.error.clone() {
        return (status, Json(error)).into_response();
    }

    state.kluster = body.clone();
    Json(body).into_response()
}

async fn openstack_metadata(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    state.record("GET", "/api/v1/openstack/metadata".to_string(), &headers, None);
    Json(json!({
        "flavors": [{"id": "1", "name": "m1.small"}, {"id": "2", "name": "m1.large"}],
        "securityGroups": []
    }))
    .into_response()
}

/// Name filtering is a substring match, like the unanchored regex of the real API
async fn list_servers(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    let name = query.get("name").cloned().unwrap_or_default();
    let marker = query.get("marker").cloned();

    let path = match &marker {
        Some(marker) => format!("/compute/servers?marker={}", marker),
        None => "/compute/servers".to_string(),
    };
    state.record("GET", path, &headers, None);

    let matching: Vec<_> = state
        .servers
        .iter()
        .filter(|(_, server)| server.contains(&name))
        .collect();
    let start = marker
        .and_then(|marker| matching.iter().position(|(id, _)| *id == marker))
        .map_or(0, |i| i + 1);
    let page_size = state.page_size.unwrap_or(matching.len().max(1));
    let page: Vec<_> = matching.iter().skip(start).take(page_size).collect();

    let mut links = Vec::new();
    if start + page.len() < matching.len() {
        if let Some((last, _)) = page.last() {
            links.push(json!({
                "rel": "next",
                "href": format!("{}/compute/servers?name={}&marker={}", state.base_url, name, last),
            }));
        }
    }

    Json(json!({
        "servers": page
            .iter()
            .map(|(id, name)| json!({"id": id, "name": name, "links": []}))
            .collect::<Vec<_>>(),
        "servers_links": links,
    }))
    .into_response()
}

async fn delete_server(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    state.record("DELETE", format!("/compute/servers/{}", id), &headers, None);

    match state.servers.iter().position(|(server, _)| *server == id) {
        Some(index) => {
            state.servers.remove(index);
            StatusCode::NO_CONTENT.into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"itemNotFound": {"code": 404, "message": "Instance could not be found"}})),
        )
            .into_response(),
    }
}
