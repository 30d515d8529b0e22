/// Cluster-management API data models
///
/// Only the fields the adapter reads are typed. Everything else is kept in
/// the flattened `extra` maps so a read-modify-write round trip sends back
/// exactly what was received.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Managed cluster resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kluster {
    pub name: String,
    #[serde(default)]
    pub spec: KlusterSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cluster specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlusterSpec {
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Node pool record, owned by the remote system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePool {
    /// Unique within the cluster
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodePool {
    pub fn new(name: impl Into<String>, size: i64) -> Self {
        Self {
            name: name.into(),
            size,
            flavor: None,
            extra: Map::new(),
        }
    }
}

/// OpenStack metadata exposed by the cluster API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenstackMetadata {
    #[serde(default)]
    pub flavors: Vec<Flavor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Machine flavor usable for node pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flavor {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// Error response from the cluster API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}
