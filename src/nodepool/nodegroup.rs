/// Node group backed by one remote node pool
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::client::{NodePoolClient, UpdateNodePoolOpts};
use crate::cloudprovider::{not_implemented, Instance, Node, NodeDeletion, NodeGroup, NodeTemplate};
use crate::error::{Error, Result};
use crate::kluster::NodePool;

/// Smallest pool size. Fixed by the remote system.
pub const MIN_SIZE: i64 = 0;

/// Largest pool size. Fixed by the remote system.
pub const MAX_SIZE: i64 = 127;

/// Node label naming the pool a node belongs to
pub const NODE_POOL_LABEL: &str = "ccloud.sap.com/nodepool";

/// Projection of one node pool as a resizable node group
///
/// The size is a cache of the remote record: set on construction (each
/// refresh builds new groups) and decremented for every node this group
/// deletes. Resizes do not touch it; the next refresh picks them up.
pub struct PoolNodeGroup {
    client: Arc<dyn NodePoolClient>,
    cluster_id: String,
    node_pool: NodePool,
    size: AtomicI64,
}

impl PoolNodeGroup {
    pub fn new(
        client: Arc<dyn NodePoolClient>,
        cluster_id: impl Into<String>,
        node_pool: NodePool,
    ) -> Self {
        let size = AtomicI64::new(node_pool.size.max(MIN_SIZE));
        Self {
            client,
            cluster_id: cluster_id.into(),
            node_pool,
            size,
        }
    }

    /// Name of the wrapped node pool
    pub fn name(&self) -> &str {
        &self.node_pool.name
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// The wrapped record with the locally tracked size
    pub fn node_pool(&self) -> NodePool {
        NodePool {
            size: self.cached_size(),
            ..self.node_pool.clone()
        }
    }

    fn cached_size(&self) -> i64 {
        self.size.load(Ordering::SeqCst)
    }

    /// Count one deleted node, never going below zero
    fn record_deleted_node(&self) {
        let _ = self
            .size
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |size| {
                Some((size - 1).max(MIN_SIZE))
            });
    }

    async fn resize(&self, target_size: i64) -> Result<()> {
        info!(
            "Resizing node pool {} of cluster {}: {} -> {}",
            self.name(),
            self.cluster_id,
            self.cached_size(),
            target_size
        );

        self.client
            .update_node_pool(
                &self.cluster_id,
                self.name(),
                UpdateNodePoolOpts::target_size(target_size),
            )
            .await?;
        Ok(())
    }

    async fn delete_node(&self, node: &Node) -> Result<()> {
        let pool = node.label(NODE_POOL_LABEL).ok_or_else(|| Error::MissingLabel {
            node: node.name.clone(),
            label: NODE_POOL_LABEL.to_string(),
        })?;

        if pool != self.name() {
            return Err(Error::InvalidArgument(format!(
                "node {} belongs to node pool {}, not {}",
                node.name,
                pool,
                self.name()
            )));
        }

        self.client
            .delete_node(&self.cluster_id, pool, &node.name)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NodeGroup for PoolNodeGroup {
    fn max_size(&self) -> i64 {
        MAX_SIZE
    }

    fn min_size(&self) -> i64 {
        MIN_SIZE
    }

    fn target_size(&self) -> Result<i64> {
        Ok(self.cached_size())
    }

    async fn increase_size(&self, delta: i64) -> Result<()> {
        if delta <= 0 {
            return Err(Error::InvalidArgument(format!(
                "size increase must be positive, got {}",
                delta
            )));
        }

        let current = self.cached_size();
        let target_size = current.saturating_add(delta);
        if target_size > MAX_SIZE {
            return Err(Error::BoundsExceeded {
                pool: self.name().to_string(),
                bound: "maximum",
                current,
                desired: target_size,
                limit: MAX_SIZE,
            });
        }

        self.resize(target_size).await
    }

    async fn decrease_target_size(&self, delta: i64) -> Result<()> {
        if delta >= 0 {
            return Err(Error::InvalidArgument(format!(
                "size decrease must be negative, got {}",
                delta
            )));
        }

        let current = self.cached_size();
        let target_size = current.saturating_add(delta);
        if target_size <= MIN_SIZE {
            return Err(Error::BoundsExceeded {
                pool: self.name().to_string(),
                bound: "minimum",
                current,
                desired: target_size,
                limit: MIN_SIZE,
            });
        }

        self.resize(target_size).await
    }

    async fn delete_nodes(&self, nodes: &[Node]) -> Vec<NodeDeletion> {
        let mut outcomes = Vec::with_capacity(nodes.len());

        for node in nodes {
            let result = self.delete_node(node).await;
            match &result {
                Ok(()) => {
                    self.record_deleted_node();
                    info!(
                        "Deleted node {} from node pool {} (cached size: {})",
                        node.name,
                        self.name(),
                        self.cached_size()
                    );
                }
                Err(e) => warn!(
                    "Failed to delete node {} from node pool {}: {}",
                    node.name,
                    self.name(),
                    e
                ),
            }

            outcomes.push(NodeDeletion {
                node: node.name.clone(),
                result,
            });
        }

        outcomes
    }

    fn id(&self) -> &str {
        self.name()
    }

    fn debug(&self) -> String {
        format!(
            "cluster {}: node pool {} (min:{} max:{})",
            self.cluster_id,
            self.name(),
            MIN_SIZE,
            MAX_SIZE
        )
    }

    fn nodes(&self) -> Result<Vec<Instance>> {
        not_implemented("listing the instances of a node pool")
    }

    fn template_node_info(&self) -> Result<NodeTemplate> {
        not_implemented("node templates")
    }

    /// A group is only ever built from a record, so it always exists
    fn exist(&self) -> bool {
        true
    }

    async fn create(&self) -> Result<Arc<dyn NodeGroup>> {
        not_implemented("creating node pools")
    }

    async fn delete(&self) -> Result<()> {
        not_implemented("deleting node pools")
    }

    fn autoprovisioned(&self) -> bool {
        false
    }
}
