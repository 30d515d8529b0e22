/// Plugin contract between the autoscaling loop and a node pool provider
///
/// The autoscaling loop only ever talks to [`CloudProvider`] and
/// [`NodeGroup`]. Every operation of the contract is present on the traits;
/// capabilities a provider does not offer return [`Error::NotImplemented`]
/// instead of being left out.
pub mod provider;

pub use provider::{build, NodePoolCloudProvider};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A running cluster node as seen by the autoscaling loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Machine backing a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
}

/// Node taint passed when creating node groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taint {
    pub key: String,
    pub value: String,
    pub effect: String,
}

/// Template of a fresh node of a group, used for scheduling simulation
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    pub node: Node,
    pub allocatable: HashMap<String, String>,
}

/// Outcome of deleting one node of a batch
#[derive(Debug)]
pub struct NodeDeletion {
    pub node: String,
    pub result: Result<()>,
}

impl NodeDeletion {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Cluster-wide resource bounds enforced by the autoscaling loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimiter {
    min_limits: HashMap<String, i64>,
    max_limits: HashMap<String, i64>,
}

impl ResourceLimiter {
    pub fn new(min_limits: HashMap<String, i64>, max_limits: HashMap<String, i64>) -> Self {
        Self {
            min_limits,
            max_limits,
        }
    }

    /// Minimum for a resource, 0 when unset
    pub fn get_min(&self, resource: &str) -> i64 {
        self.min_limits.get(resource).copied().unwrap_or(0)
    }

    /// Maximum for a resource, `i64::MAX` when unset
    pub fn get_max(&self, resource: &str) -> i64 {
        self.max_limits.get(resource).copied().unwrap_or(i64::MAX)
    }

    /// Names of all limited resources
    pub fn resources(&self) -> HashSet<&str> {
        self.min_limits
            .keys()
            .chain(self.max_limits.keys())
            .map(String::as_str)
            .collect()
    }
}

/// Price of running nodes
pub trait PricingModel: Send + Sync {
    fn node_price(&self, node: &Node, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64>;
}

/// One resizable group of nodes
#[async_trait]
pub trait NodeGroup: Send + Sync {
    /// Largest size the group may be resized to
    fn max_size(&self) -> i64;

    /// Smallest size the group may be resized to
    fn min_size(&self) -> i64;

    /// Size the group is expected to have
    fn target_size(&self) -> Result<i64>;

    /// Grow the group by `delta` nodes
    async fn increase_size(&self, delta: i64) -> Result<()>;

    /// Shrink the target size by `delta` (negative) without deleting specific nodes
    async fn decrease_target_size(&self, delta: i64) -> Result<()>;

    /// Delete the given nodes, one outcome per node in input order
    async fn delete_nodes(&self, nodes: &[Node]) -> Vec<NodeDeletion>;

    /// Stable identifier of the group
    fn id(&self) -> &str;

    /// Human readable description
    fn debug(&self) -> String;

    /// Instances belonging to the group
    fn nodes(&self) -> Result<Vec<Instance>>;

    /// Template node for scheduling simulation
    fn template_node_info(&self) -> Result<NodeTemplate>;

    /// Whether the group exists on the provider side
    fn exist(&self) -> bool;

    /// Create the group on the provider side
    async fn create(&self) -> Result<Arc<dyn NodeGroup>>;

    /// Delete the group on the provider side
    async fn delete(&self) -> Result<()>;

    /// Whether the group was created by the autoscaler
    fn autoprovisioned(&self) -> bool;
}

/// Provider of node groups for the autoscaling loop
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Current node groups. Handles must not be kept across a refresh.
    fn node_groups(&self) -> Vec<Arc<dyn NodeGroup>>;

    /// Group owning the node
    fn node_group_for_node(&self, node: &Node) -> Result<Arc<dyn NodeGroup>>;

    fn pricing(&self) -> Result<Arc<dyn PricingModel>>;

    async fn get_available_machine_types(&self) -> Result<Vec<String>>;

    async fn new_node_group(
        &self,
        machine_type: &str,
        labels: &HashMap<String, String>,
        system_labels: &HashMap<String, String>,
        taints: &[Taint],
        extra_resources: &HashMap<String, String>,
    ) -> Result<Arc<dyn NodeGroup>>;

    fn get_resource_limiter(&self) -> Result<&ResourceLimiter>;

    /// Label marking nodes with GPUs
    fn gpu_label(&self) -> &str;

    fn get_available_gpu_types(&self) -> HashSet<String>;

    /// Release provider resources before shutdown
    fn cleanup(&self) -> Result<()>;

    /// Resynchronise node groups with the remote system
    async fn refresh(&self) -> Result<()>;
}

pub(crate) fn not_implemented<T>(what: &'static str) -> Result<T> {
    Err(Error::NotImplemented(what))
}
