//! Error types for kurl

use thiserror::Error;

use crate::k8s::ResourceKind;

/// Main error type for kurl
#[derive(Error, Debug)]
pub enum KurlError {
    #[error("Invalid Kubernetes resource URL {url}: {reason}")]
    InvalidAddressFormat {
        url: String,
        reason: String,
    },

    #[error("Unsupported resource type: {token} (supported: {})", ResourceKind::vocabulary())]
    UnsupportedResourceKind {
        token: String,
    },

    #[error("Invalid {field}: {value}")]
    InvalidResourceName {
        field: &'static str,
        value: String,
    },

    #[error("{kind} {name} not found in namespace {namespace}")]
    ResourceNotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("No pods found for {kind} {name} in namespace {namespace}")]
    NoBackingPods {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("Kubernetes API error: {0}")]
    ClusterApi(String),

    #[error("Cannot forward to {kind} {name}: target must be resolved to a pod first")]
    UnresolvedTarget {
        kind: ResourceKind,
        name: String,
    },

    #[error("Port-forward failed to connect: {0}")]
    TunnelConnect(String),

    #[error("Port-forward broken: {0}")]
    TunnelBroken(String),

    #[error("Failed to allocate local port: {0}")]
    Allocation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl From<kube::Error> for KurlError {
    fn from(err: kube::Error) -> Self {
        KurlError::ClusterApi(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KurlError>;
