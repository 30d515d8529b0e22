/// Error types shared by every layer of the adapter
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the node pool adapter
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or malformed. Raised before any network call.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport, authentication or remote-reported failure
    #[error("{context}: {message}")]
    RemoteApi { context: String, message: String },

    /// A named cluster, node pool or machine matched zero or several resources
    #[error("{kind} {name}: {detail}")]
    NotFound {
        kind: &'static str,
        name: String,
        detail: String,
    },

    /// The caller violated a precondition
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A resize would leave the fixed size envelope
    #[error(
        "node pool {pool} size would exceed the {bound}. current: {current}, desired: {desired}, {bound}: {limit}"
    )]
    BoundsExceeded {
        pool: String,
        bound: &'static str,
        current: i64,
        desired: i64,
        limit: i64,
    },

    /// The node carries no node pool label
    #[error("cannot identify node group: label {label} is not present on node {node}")]
    MissingLabel { node: String, label: String },

    /// The node's pool label names no known node group
    #[error("cannot identify node group: no node group {pool} exists for node {node}")]
    NoSuchGroup { node: String, pool: String },

    /// Deliberately unsupported capability
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

impl Error {
    pub(crate) fn remote(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RemoteApi {
            context: context.into(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(
        kind: &'static str,
        name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error marks an intentionally unsupported operation
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented(_))
    }
}
