//! Forwarding targets
//!
//! A [`TargetDescriptor`] names the namespace, resource and remote port a
//! request should reach. Only the resolver may turn a workload target into a
//! pod target, and it does so by building a new descriptor.

use std::fmt;

/// Kubernetes resource kinds that can be addressed in a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    Service,
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
}

/// Host label tokens and the kind each one selects, in help-text order
const KIND_TOKENS: &[(&str, ResourceKind)] = &[
    ("svc", ResourceKind::Service),
    ("pod", ResourceKind::Pod),
    ("deploy", ResourceKind::Deployment),
    ("deployment", ResourceKind::Deployment),
    ("sts", ResourceKind::StatefulSet),
    ("statefulset", ResourceKind::StatefulSet),
    ("ds", ResourceKind::DaemonSet),
    ("daemonset", ResourceKind::DaemonSet),
    ("rs", ResourceKind::ReplicaSet),
    ("replicaset", ResourceKind::ReplicaSet),
];

impl ResourceKind {
    /// Look up the kind for a host label token (exact, case-sensitive)
    pub fn from_token(token: &str) -> Option<Self> {
        KIND_TOKENS
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, kind)| *kind)
    }

    /// Comma-separated list of every accepted token
    pub fn vocabulary() -> String {
        KIND_TOKENS
            .iter()
            .map(|(t, _)| *t)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Plural resource name used by the API server
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pods",
            ResourceKind::Service => "services",
            ResourceKind::Deployment => "deployments",
            ResourceKind::StatefulSet => "statefulsets",
            ResourceKind::DaemonSet => "daemonsets",
            ResourceKind::ReplicaSet => "replicasets",
        }
    }

    /// Pods are forwarded to directly; every other kind needs resolving
    pub fn is_pod(&self) -> bool {
        matches!(self, ResourceKind::Pod)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

/// Where a request should be forwarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    namespace: String,
    name: String,
    kind: ResourceKind,
    port: u16,
}

impl TargetDescriptor {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        kind: ResourceKind,
        port: u16,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
            port,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Remote container or service port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// A pod target in the same namespace and on the same port
    pub fn resolved_to(&self, pod_name: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: pod_name.into(),
            kind: ResourceKind::Pod,
            port: self.port,
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "namespace={}, name={}, kind={}, port={}",
            self.namespace, self.name, self.kind, self.port
        )
    }
}
