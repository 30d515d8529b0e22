//! Node pool scaling adapter
//!
//! Presents the node pools of a remotely managed cluster as resizable node
//! groups to an autoscaling loop, and turns its resize and node deletion
//! requests into calls against the cluster-management and compute APIs.
//!
//! ```no_run
//! use poolscale::cloudprovider::{self, CloudProvider, NodeGroup, ResourceLimiter};
//! use poolscale::config::Config;
//!
//! # async fn run() -> poolscale::Result<()> {
//! let config = Config::load(None)?;
//! let provider = cloudprovider::build(&config, ResourceLimiter::default()).await?;
//! for group in provider.node_groups() {
//!     println!("{}: {}", group.id(), group.target_size()?);
//! }
//! # Ok(())
//! # }
//! ```
pub mod cloudprovider;
pub mod config;
pub mod error;
pub mod kluster;
pub mod nodepool;
pub mod openstack;

pub use error::{Error, Result};
