/// Remote node pool operations for one managed cluster
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::kluster::{KlusterClient, NodePool};
use crate::openstack::{ComputeClient, KeystoneAuth, StaticToken, TokenProvider};

/// Options for [`NodePoolClient::update_node_pool`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateNodePoolOpts {
    /// New pool size. Zero or unset leaves the size untouched.
    pub target_size: Option<i64>,
}

impl UpdateNodePoolOpts {
    pub fn target_size(size: i64) -> Self {
        Self {
            target_size: Some(size),
        }
    }
}

/// Operations the node groups need from the remote system
#[async_trait]
pub trait NodePoolClient: Send + Sync {
    /// Return the node pools of the given cluster
    async fn list_node_pools(&self, cluster_name: &str) -> Result<Vec<NodePool>>;

    /// Update a node pool and return its post-update record
    ///
    /// This rewrites the whole cluster spec. A change made by someone else
    /// between the read and the write is overwritten (last writer wins); the
    /// API offers no concurrency token to prevent it.
    async fn update_node_pool(
        &self,
        cluster_name: &str,
        node_pool_name: &str,
        opts: UpdateNodePoolOpts,
    ) -> Result<NodePool>;

    /// Terminate a machine and return the refreshed record of its pool
    async fn delete_node(
        &self,
        cluster_name: &str,
        node_pool_name: &str,
        node_name: &str,
    ) -> Result<NodePool>;

    /// List the machine flavors usable for node pools
    async fn get_available_machine_types(&self) -> Result<Vec<String>>;
}

/// [`NodePoolClient`] backed by the cluster-management and compute APIs
#[derive(Clone)]
pub struct RemotePoolClient {
    kluster: KlusterClient,
    compute: ComputeClient,
}

impl RemotePoolClient {
    pub fn new(kluster: KlusterClient, compute: ComputeClient) -> Self {
        Self { kluster, compute }
    }

    /// Build the HTTP clients from configuration. Sends no request.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        let auth: Arc<dyn TokenProvider> = match &config.identity.token {
            Some(token) => Arc::new(StaticToken::new(token.clone(), config.compute_url.clone())),
            None => Arc::new(KeystoneAuth::new(
                http.clone(),
                config.identity.clone(),
                config.compute_url.clone(),
            )?),
        };

        let kluster = KlusterClient::new(http.clone(), &config.url, auth.clone())?;
        let compute = ComputeClient::new(http, auth);

        Ok(Self::new(kluster, compute))
    }
}

#[async_trait]
impl NodePoolClient for RemotePoolClient {
    async fn list_node_pools(&self, cluster_name: &str) -> Result<Vec<NodePool>> {
        let kluster = self.kluster.show_cluster(cluster_name).await?;
        debug!(
            "Cluster {} has {} node pools",
            cluster_name,
            kluster.spec.node_pools.len()
        );
        Ok(kluster.spec.node_pools)
    }

    async fn update_node_pool(
        &self,
        cluster_name: &str,
        node_pool_name: &str,
        opts: UpdateNodePoolOpts,
    ) -> Result<NodePool> {
        let mut kluster = self.kluster.show_cluster(cluster_name).await?;
        find_node_pool(&kluster.spec.node_pools, node_pool_name)?;

        kluster.spec.node_pools = kluster
            .spec
            .node_pools
            .into_iter()
            .map(|pool| apply_update(pool, node_pool_name, opts))
            .collect();

        let updated = self.kluster.update_cluster(&kluster).await?;
        let pool = find_node_pool(&updated.spec.node_pools, node_pool_name)?;

        info!(
            "Node pool {} of cluster {} updated (size: {})",
            node_pool_name, cluster_name, pool.size
        );
        Ok(pool)
    }

    async fn delete_node(
        &self,
        cluster_name: &str,
        node_pool_name: &str,
        node_name: &str,
    ) -> Result<NodePool> {
        self.compute.delete_server_by_name(node_name).await?;

        let kluster = self.kluster.show_cluster(cluster_name).await?;
        find_node_pool(&kluster.spec.node_pools, node_pool_name)
    }

    async fn get_available_machine_types(&self) -> Result<Vec<String>> {
        let metadata = self.kluster.openstack_metadata().await?;
        Ok(metadata.flavors.into_iter().map(|f| f.name).collect())
    }
}

/// Return a copy of the named pool
pub(crate) fn find_node_pool(node_pools: &[NodePool], node_pool_name: &str) -> Result<NodePool> {
    node_pools
        .iter()
        .find(|pool| pool.name == node_pool_name)
        .cloned()
        .ok_or_else(|| Error::not_found("node pool", node_pool_name, "no node pool with that name"))
}

/// Apply the update to the named pool, leave every other pool untouched
pub(crate) fn apply_update(mut pool: NodePool, node_pool_name: &str, opts: UpdateNodePoolOpts) -> NodePool {
    if pool.name != node_pool_name {
        return pool;
    }

    if let Some(size) = opts.target_size.filter(|size| *size > 0) {
        pool.size = size;
    }

    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodepool::testing::{MockApi, TEST_TOKEN};
    use serde_json::{json, Value};
    use tokio_test::assert_ok;

    fn demo_kluster() -> Value {
        json!({
            "name": "demo",
            "status": {"phase": "Running"},
            "spec": {
                "version": "1.10.1",
                "sshPublicKey": "ssh-ed25519 AAAA",
                "nodePools": [
                    {"name": "pool-a", "size": 3, "flavor": "m1.small", "image": "coreos", "config": {"autoUpdate": true}},
                    {"name": "pool-b", "size": 1, "flavor": "m1.large", "availabilityZone": "eu-de-1a"}
                ]
            }
        })
    }

    fn pools() -> Vec<NodePool> {
        vec![NodePool::new("pool-a", 3), NodePool::new("pool-b", 5)]
    }

    #[test]
    fn test_apply_update_only_touches_named_pool() {
        let updated: Vec<_> = pools()
            .into_iter()
            .map(|p| apply_update(p, "pool-b", UpdateNodePoolOpts::target_size(7)))
            .collect();

        assert_eq!(updated[0], NodePool::new("pool-a", 3));
        assert_eq!(updated[1], NodePool::new("pool-b", 7));
    }

    #[test]
    fn test_zero_or_unset_target_is_noop() {
        let pool = NodePool::new("pool-a", 3);
        assert_eq!(
            apply_update(pool.clone(), "pool-a", UpdateNodePoolOpts::target_size(0)).size,
            3
        );
        assert_eq!(
            apply_update(pool, "pool-a", UpdateNodePoolOpts::default()).size,
            3
        );
    }

    #[test]
    fn test_find_node_pool() {
        assert_eq!(find_node_pool(&pools(), "pool-b").unwrap().size, 5);

        let err = find_node_pool(&pools(), "pool-c").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "node pool", .. }));
        assert!(err.to_string().contains("pool-c"));
    }

    #[test]
    fn test_from_config_sends_nothing() {
        let mut config = Config::example();
        config.identity.password = Some("secret".to_string());
        assert!(RemotePoolClient::from_config(&config).is_ok());

        config.url = "::nope".to_string();
        assert!(matches!(
            RemotePoolClient::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_update_only_changes_target_pool_size() {
        let api = MockApi::start(demo_kluster()).await;
        let client = api.remote_client();

        let pool = client
            .update_node_pool("demo", "pool-a", UpdateNodePoolOpts::target_size(5))
            .await
            .unwrap();
        assert_eq!(pool.size, 5);
        assert_eq!(pool.extra["image"], "coreos");

        let mut expected = demo_kluster();
        expected["spec"]["nodePools"][0]["size"] = json!(5);

        let requests = api.requests();
        assert_eq!(api.methods(), ["GET", "PUT"]);
        assert_eq!(requests[1].path, "/api/v1/clusters/demo");
        assert_eq!(requests[1].body.as_ref(), Some(&expected));
        assert!(requests.iter().all(|r| r.token.as_deref() == Some(TEST_TOKEN)));
    }

    #[tokio::test]
    async fn test_update_overwrites_concurrent_change() {
        let api = MockApi::start(demo_kluster()).await;
        let mut other = demo_kluster();
        other["spec"]["version"] = json!("1.11.0");
        other["spec"]["nodePools"][1]["size"] = json!(4);
        api.concurrent_write(other);

        assert_ok!(
            api.remote_client()
                .update_node_pool("demo", "pool-a", UpdateNodePoolOpts::target_size(5))
                .await
        );

        // the write made between our read and our write is lost
        let stored = api.kluster();
        assert_eq!(stored["spec"]["version"], "1.10.1");
        assert_eq!(stored["spec"]["nodePools"][1]["size"], 1);
        assert_eq!(stored["spec"]["nodePools"][0]["size"], 5);
    }

    #[tokio::test]
    async fn test_update_missing_pool_sends_no_put() {
        let api = MockApi::start(demo_kluster()).await;

        let err = api
            .remote_client()
            .update_node_pool("demo", "pool-z", UpdateNodePoolOpts::target_size(2))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { kind: "node pool", .. }));
        assert_eq!(api.methods(), ["GET"]);
        assert_eq!(api.kluster(), demo_kluster());
    }

    #[tokio::test]
    async fn test_api_error_message_is_surfaced() {
        let api = MockApi::start(demo_kluster()).await;
        api.fail_with(403, json!({"code": 403, "message": "not allowed to update cluster demo"}));
        let client = api.remote_client();

        let err = client
            .update_node_pool("demo", "pool-a", UpdateNodePoolOpts::target_size(5))
            .await
            .unwrap_err();
        match err {
            Error::RemoteApi { context, message } => {
                assert_eq!(context, "error getting cluster demo");
                assert_eq!(message, "not allowed to update cluster demo");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = client.list_node_pools("demo").await.unwrap_err();
        assert!(err.to_string().contains("not allowed to update cluster demo"));
    }

    #[tokio::test]
    async fn test_list_node_pools_over_http() {
        let api = MockApi::start(demo_kluster()).await;

        let pools = api.remote_client().list_node_pools("demo").await.unwrap();
        let names: Vec<_> = pools.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["pool-a", "pool-b"]);
        assert_eq!(pools[1].size, 1);
    }

    #[tokio::test]
    async fn test_delete_node_then_rereads_pool() {
        let api = MockApi::start(demo_kluster()).await;
        api.add_server("srv-1", "demo-pool-a-abc");
        api.add_server("srv-2", "demo-pool-a-abc-2");

        let pool = api
            .remote_client()
            .delete_node("demo", "pool-a", "demo-pool-a-abc")
            .await
            .unwrap();
        assert_eq!(pool.name, "pool-a");
        assert_eq!(pool.size, 3);

        let paths: Vec<_> = api.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            [
                "/compute/servers",
                "/compute/servers/srv-1",
                "/api/v1/clusters/demo"
            ]
        );
        assert_eq!(api.methods(), ["GET", "DELETE", "GET"]);
    }

    #[tokio::test]
    async fn test_delete_ambiguous_node_deletes_nothing() {
        let api = MockApi::start(demo_kluster()).await;
        api.add_server("srv-1", "demo-pool-a-abc");
        api.add_server("srv-2", "demo-pool-a-abc");

        let err = api
            .remote_client()
            .delete_node("demo", "pool-a", "demo-pool-a-abc")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { kind: "server", .. }));
        assert_eq!(api.methods(), ["GET"]);
    }

    #[tokio::test]
    async fn test_machine_types_over_http() {
        let api = MockApi::start(demo_kluster()).await;

        let types = api.remote_client().get_available_machine_types().await.unwrap();
        assert_eq!(types, ["m1.small", "m1.large"]);
        assert_eq!(api.requests()[0].path, "/api/v1/openstack/metadata");
    }
}
