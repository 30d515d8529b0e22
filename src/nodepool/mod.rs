/// Node pools of the managed cluster as resizable node groups
pub mod client;
pub mod manager;
pub mod nodegroup;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{NodePoolClient, RemotePoolClient, UpdateNodePoolOpts};
pub use manager::NodePoolManager;
pub use nodegroup::{PoolNodeGroup, MAX_SIZE, MIN_SIZE, NODE_POOL_LABEL};
