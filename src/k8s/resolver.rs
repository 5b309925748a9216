//! Resource resolution
//!
//! Turns a target naming a Service or workload into a target naming one of
//! its pods.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::KurlError;
use super::parser::{parse_cluster_url, ClusterUrl};
use super::selector::Selector;
use super::target::{ResourceKind, TargetDescriptor};

/// Read access to the cluster needed for resolution
///
/// Implementations must report a missing resource as
/// [`KurlError::ResourceNotFound`] and transport failures as
/// [`KurlError::ClusterApi`].
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Pod selector of a Service, Deployment, StatefulSet, DaemonSet or ReplicaSet
    async fn selector_for(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Selector, KurlError>;

    /// Names of pods in `namespace` matching `selector`, in API order
    async fn list_pods(&self, namespace: &str, selector: &Selector) -> Result<Vec<String>, KurlError>;
}

/// Resolves workload targets to pod targets
#[derive(Clone)]
pub struct Resolver {
    query: Arc<dyn ClusterQuery>,
}

impl Resolver {
    pub fn new(query: Arc<dyn ClusterQuery>) -> Self {
        Self { query }
    }

    /// Resolve a target to a concrete pod
    ///
    /// Pod targets are returned unchanged without touching the cluster. For
    /// any other kind, the first pod listed for the resource's selector is
    /// chosen. Listing order comes from the API server, so the same cluster
    /// state always yields the same pod; address a pod directly to pick a
    /// different one.
    pub async fn resolve(&self, target: &TargetDescriptor) -> Result<TargetDescriptor, KurlError> {
        if target.kind().is_pod() {
            return Ok(target.clone());
        }

        let selector = self
            .query
            .selector_for(target.kind(), target.namespace(), target.name())
            .await?;

        // A selector-less Service would otherwise match every pod in the namespace
        if selector.is_empty() {
            return Err(no_backing_pods(target));
        }

        debug!(
            kind = %target.kind(),
            name = target.name(),
            namespace = target.namespace(),
            selector = %selector,
            "Listing pods for selector"
        );

        let pods = self.query.list_pods(target.namespace(), &selector).await?;
        let pod = pods.into_iter().next().ok_or_else(|| no_backing_pods(target))?;

        info!(
            pod = %pod,
            kind = %target.kind(),
            name = target.name(),
            namespace = target.namespace(),
            "Found matching pod"
        );

        Ok(target.resolved_to(pod))
    }
}

fn no_backing_pods(target: &TargetDescriptor) -> KurlError {
    KurlError::NoBackingPods {
        kind: target.kind(),
        namespace: target.namespace().to_string(),
        name: target.name().to_string(),
    }
}

/// Parse a cluster URL and resolve its target to a pod
pub async fn resolve_url(
    query: Arc<dyn ClusterQuery>,
    url: &str,
) -> Result<(ClusterUrl, TargetDescriptor), KurlError> {
    let parsed = parse_cluster_url(url)?;
    let target = Resolver::new(query).resolve(&parsed.target).await?;
    Ok((parsed, target))
}
