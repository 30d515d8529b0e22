/// Cluster-management API client implementation
pub mod client;
pub mod models;

pub use client::KlusterClient;
pub use models::{Kluster, NodePool};
