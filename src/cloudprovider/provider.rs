/// Cloud provider exposing the cluster's node pools to the autoscaling loop
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use super::{
    not_implemented, CloudProvider, Node, NodeGroup, PricingModel, ResourceLimiter, Taint,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::nodepool::{NodePoolManager, NODE_POOL_LABEL};

/// Name reported to the autoscaling loop
pub const PROVIDER_NAME: &str = "nodepool";

/// GPU nodes are not labelled
pub const GPU_LABEL: &str = "";

const AVAILABLE_GPU_TYPES: &[&str] = &["nvidia-tesla-v100"];

/// Node pool backed [`CloudProvider`]
pub struct NodePoolCloudProvider {
    manager: Arc<NodePoolManager>,
    resource_limiter: ResourceLimiter,
}

impl NodePoolCloudProvider {
    /// Create the provider, loading the node groups once
    pub async fn new(manager: Arc<NodePoolManager>, resource_limiter: ResourceLimiter) -> Result<Self> {
        manager.refresh().await?;

        Ok(Self {
            manager,
            resource_limiter,
        })
    }

    pub fn manager(&self) -> &Arc<NodePoolManager> {
        &self.manager
    }
}

#[async_trait]
impl CloudProvider for NodePoolCloudProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn node_groups(&self) -> Vec<Arc<dyn NodeGroup>> {
        self.manager
            .node_groups()
            .iter()
            .map(|group| group.clone() as Arc<dyn NodeGroup>)
            .collect()
    }

    fn node_group_for_node(&self, node: &Node) -> Result<Arc<dyn NodeGroup>> {
        let pool = node.label(NODE_POOL_LABEL).ok_or_else(|| Error::MissingLabel {
            node: node.name.clone(),
            label: NODE_POOL_LABEL.to_string(),
        })?;

        match self.manager.node_group(pool) {
            Some(group) => Ok(group as Arc<dyn NodeGroup>),
            None => Err(Error::NoSuchGroup {
                node: node.name.clone(),
                pool: pool.to_string(),
            }),
        }
    }

    fn pricing(&self) -> Result<Arc<dyn PricingModel>> {
        not_implemented("pricing")
    }

    async fn get_available_machine_types(&self) -> Result<Vec<String>> {
        self.manager.client().get_available_machine_types().await
    }

    async fn new_node_group(
        &self,
        _machine_type: &str,
        _labels: &HashMap<String, String>,
        _system_labels: &HashMap<String, String>,
        _taints: &[Taint],
        _extra_resources: &HashMap<String, String>,
    ) -> Result<Arc<dyn NodeGroup>> {
        not_implemented("creating node groups")
    }

    fn get_resource_limiter(&self) -> Result<&ResourceLimiter> {
        Ok(&self.resource_limiter)
    }

    fn gpu_label(&self) -> &str {
        GPU_LABEL
    }

    fn get_available_gpu_types(&self) -> HashSet<String> {
        AVAILABLE_GPU_TYPES.iter().map(|t| t.to_string()).collect()
    }

    fn cleanup(&self) -> Result<()> {
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        self.manager.refresh().await
    }
}

/// Build the provider from configuration
///
/// The configuration is validated before anything is sent; the initial
/// node pool listing is the first remote call.
pub async fn build(config: &Config, resource_limiter: ResourceLimiter) -> Result<NodePoolCloudProvider> {
    let manager = NodePoolManager::from_config(config)?;
    info!(
        "Managing node pools of cluster {} at {}",
        config.cluster_name, config.url
    );

    NodePoolCloudProvider::new(Arc::new(manager), resource_limiter).await
}
