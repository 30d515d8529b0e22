/// Registry of the node groups of one cluster
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use super::client::{NodePoolClient, RemotePoolClient};
use super::nodegroup::PoolNodeGroup;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::kluster::NodePool;

/// Owns the node groups of a cluster and rebuilds them on refresh
///
/// A refresh swaps the whole list at once. Readers get either the old or
/// the new list, and handles taken before a refresh keep pointing at the
/// old groups.
pub struct NodePoolManager {
    client: Arc<dyn NodePoolClient>,
    cluster_name: String,
    node_groups: RwLock<Arc<Vec<Arc<PoolNodeGroup>>>>,
}

impl NodePoolManager {
    /// Create a manager with an empty registry
    pub fn new(cluster_name: impl Into<String>, client: Arc<dyn NodePoolClient>) -> Result<Self> {
        let cluster_name = cluster_name.into();
        if cluster_name.is_empty() {
            return Err(Error::Config("cluster_name not provided".to_string()));
        }

        Ok(Self {
            client,
            cluster_name,
            node_groups: RwLock::new(Arc::new(Vec::new())),
        })
    }

    /// Validate the configuration and build the remote clients. Sends no request.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = RemotePoolClient::from_config(config)?;
        Self::new(config.cluster_name.clone(), Arc::new(client))
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn client(&self) -> &Arc<dyn NodePoolClient> {
        &self.client
    }

    /// Current node groups, in the order the remote API listed them
    pub fn node_groups(&self) -> Arc<Vec<Arc<PoolNodeGroup>>> {
        self.node_groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Node group wrapping the named pool
    pub fn node_group(&self, name: &str) -> Option<Arc<PoolNodeGroup>> {
        self.node_groups()
            .iter()
            .find(|group| group.name() == name)
            .cloned()
    }

    /// Records of all node groups with their locally tracked sizes
    pub fn snapshot(&self) -> Vec<NodePool> {
        self.node_groups()
            .iter()
            .map(|group| group.node_pool())
            .collect()
    }

    /// Rebuild every node group from the remote node pools
    ///
    /// On failure the previous node groups stay in place.
    pub async fn refresh(&self) -> Result<()> {
        debug!("Refreshing node pools of cluster {}", self.cluster_name);
        let node_pools = self.client.list_node_pools(&self.cluster_name).await?;

        let node_groups: Vec<_> = node_pools
            .into_iter()
            .map(|pool| {
                Arc::new(PoolNodeGroup::new(
                    self.client.clone(),
                    self.cluster_name.clone(),
                    pool,
                ))
            })
            .collect();

        info!(
            "Cluster {} has {} node groups",
            self.cluster_name,
            node_groups.len()
        );

        *self
            .node_groups
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(node_groups);
        Ok(())
    }
}
