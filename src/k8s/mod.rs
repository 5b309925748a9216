//! Kubernetes integration module
//!
//! Resolves in-cluster style URLs to a pod and port-forwards a local port to
//! it, so requests can be made against `localhost` without a manual
//! `kubectl port-forward`.
//!
//! # URL Format
//! ```text
//! http[s]://name.namespace.kind[.cluster.local][:port][/path]
//! ```
//!
//! # Examples
//! ```text
//! http://api-server.default.svc:8080/health
//! http://web.production.deploy/api/v1/users
//! https://postgres-0.db.pod:8443
//! http://grafana.monitoring.svc.cluster.local:3000
//! ```

pub mod client;
pub mod parser;
pub mod port;
pub mod portforward;
pub mod resolver;
pub mod selector;
pub mod target;

pub use client::KubeCluster;
pub use parser::{ClusterUrl, is_cluster_url, parse_cluster_url, parse_target_url};
pub use port::allocate_local_port;
pub use portforward::{CancelHandle, PodStream, SessionState, TunnelSession, TunnelStream, TunnelTransport};
pub use resolver::{ClusterQuery, Resolver, resolve_url};
pub use selector::{Requirement, Selector};
pub use target::{ResourceKind, TargetDescriptor};
