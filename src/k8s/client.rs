//! Cluster access through kube-rs
//!
//! [`KubeCluster`] answers resolver queries and opens port-forward streams
//! using the current kubeconfig (or in-cluster) credentials.

use std::fmt::Debug;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Portforwarder};
use kube::config::KubeConfigOptions;
use kube::{Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::KurlError;
use super::portforward::{PodStream, TunnelTransport};
use super::resolver::ClusterQuery;
use super::selector::Selector;
use super::target::{ResourceKind, TargetDescriptor};

/// Which pod port a port-forward was opened for
#[derive(Debug, Clone, PartialEq, Eq)]
struct ForwardKey {
    namespace: String,
    pod: String,
    port: u16,
}

impl From<&TargetDescriptor> for ForwardKey {
    fn from(target: &TargetDescriptor) -> Self {
        Self {
            namespace: target.namespace().to_string(),
            pod: target.name().to_string(),
            port: target.port(),
        }
    }
}

/// Port-forward opened while connecting, handed to the first local connection
struct WarmForward {
    key: ForwardKey,
    forwarder: Portforwarder,
}

/// Kubernetes API access for resolution and tunnelling
pub struct KubeCluster {
    client: Client,
    warm: Mutex<Option<WarmForward>>,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            warm: Mutex::new(None),
        }
    }

    /// Build a client from the kubeconfig, optionally for a specific context
    ///
    /// Without a context this falls back to the standard inference order:
    /// `KUBECONFIG`, `~/.kube/config`, then the in-cluster service account.
    pub async fn from_kubeconfig(context: Option<&str>) -> Result<Self, KurlError> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                Config::from_kubeconfig(&options).await.map_err(|e| {
                    KurlError::Config(format!("failed to load kubeconfig context {}: {}", context, e))
                })?
            }
            None => Config::infer()
                .await
                .map_err(|e| KurlError::Config(format!("failed to create Kubernetes config: {}", e)))?,
        };

        debug!(cluster_url = %config.cluster_url, namespace = %config.default_namespace, "Loaded cluster config");

        let client = Client::try_from(config)
            .map_err(|e| KurlError::Config(format!("failed to create Kubernetes client: {}", e)))?;
        Ok(Self::new(client))
    }

    async fn get<K>(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<K, KurlError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await?
            .ok_or_else(|| KurlError::ResourceNotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn take_warm(&self, target: &TargetDescriptor) -> Result<Option<Portforwarder>, KurlError> {
        let mut warm = self.warm.lock()
            .map_err(|e| KurlError::TunnelBroken(format!("Lock error: {}", e)))?;

        let matches = warm.as_ref().is_some_and(|w| w.key == ForwardKey::from(target));
        Ok(if matches { warm.take().map(|w| w.forwarder) } else { None })
    }
}

fn workload_selector(selector: Option<&LabelSelector>) -> Result<Selector, KurlError> {
    match selector {
        Some(selector) => Selector::from_label_selector(selector),
        None => Ok(Selector::default()),
    }
}

#[async_trait]
impl ClusterQuery for KubeCluster {
    async fn selector_for(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Selector, KurlError> {
        match kind {
            ResourceKind::Pod => Err(KurlError::ClusterApi(format!(
                "pod {} has no selector; pods are forwarded to directly", name
            ))),
            ResourceKind::Service => {
                let service: Service = self.get(kind, namespace, name).await?;
                let labels = service.spec.and_then(|spec| spec.selector).unwrap_or_default();
                Ok(Selector::from_labels(&labels))
            }
            ResourceKind::Deployment => {
                let deployment: Deployment = self.get(kind, namespace, name).await?;
                workload_selector(deployment.spec.as_ref().map(|spec| &spec.selector))
            }
            ResourceKind::StatefulSet => {
                let statefulset: StatefulSet = self.get(kind, namespace, name).await?;
                workload_selector(statefulset.spec.as_ref().map(|spec| &spec.selector))
            }
            ResourceKind::DaemonSet => {
                let daemonset: DaemonSet = self.get(kind, namespace, name).await?;
                workload_selector(daemonset.spec.as_ref().map(|spec| &spec.selector))
            }
            ResourceKind::ReplicaSet => {
                let replicaset: ReplicaSet = self.get(kind, namespace, name).await?;
                workload_selector(replicaset.spec.as_ref().map(|spec| &spec.selector))
            }
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &Selector) -> Result<Vec<String>, KurlError> {
        let params = ListParams::default().labels(&selector.to_string());
        let pods = self.pods(namespace).list(&params).await?;
        Ok(pods.items.iter().map(|pod| pod.name_any()).collect())
    }
}

#[async_trait]
impl TunnelTransport for KubeCluster {
    async fn connect(&self, target: &TargetDescriptor) -> Result<(), KurlError> {
        let pods = self.pods(target.namespace());

        let pod = pods
            .get_opt(target.name())
            .await
            .map_err(|e| KurlError::TunnelConnect(e.to_string()))?
            .ok_or_else(|| KurlError::TunnelConnect(format!(
                "pod {} not found in namespace {}", target.name(), target.namespace()
            )))?;

        let phase = pod
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            .unwrap_or("Unknown");
        if phase != "Running" {
            return Err(KurlError::TunnelConnect(format!(
                "pod {} in namespace {} is not running (phase: {})",
                target.name(), target.namespace(), phase
            )));
        }

        let forwarder = pods
            .portforward(target.name(), &[target.port()])
            .await
            .map_err(|e| KurlError::TunnelConnect(format!(
                "failed to open port-forward to {}/{}:{}: {}",
                target.namespace(), target.name(), target.port(), e
            )))?;

        let mut warm = self.warm.lock()
            .map_err(|e| KurlError::TunnelConnect(format!("Lock error: {}", e)))?;
        *warm = Some(WarmForward {
            key: ForwardKey::from(target),
            forwarder,
        });
        Ok(())
    }

    async fn open_stream(&self, target: &TargetDescriptor) -> Result<PodStream, KurlError> {
        let port = target.port();
        let mut forwarder = match self.take_warm(target)? {
            Some(forwarder) => forwarder,
            None => self
                .pods(target.namespace())
                .portforward(target.name(), &[port])
                .await
                .map_err(|e| KurlError::TunnelBroken(e.to_string()))?,
        };

        let io = forwarder.take_stream(port).ok_or_else(|| {
            KurlError::TunnelBroken(format!("port {} missing from port-forward", port))
        })?;

        // Errors reported by the kubelet for this stream (e.g. nothing listening
        // on the container port) end only the affected connection
        if let Some(errors) = forwarder.take_error(port) {
            let pod = target.name().to_string();
            tokio::spawn(async move {
                if let Some(message) = errors.await {
                    warn!(pod = %pod, port, error = %message, "Port-forward error");
                }
            });
        }

        Ok(PodStream::new(io, async move {
            forwarder
                .join()
                .await
                .map_err(|e| KurlError::TunnelBroken(e.to_string()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use http::{Request, Response, StatusCode, Uri};
    use kube::client::Body;
    use serde_json::{json, Value};

    fn status(code: StatusCode, reason: &str, message: &str) -> Response<Body> {
        let body = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code.as_u16(),
        });
        Response::builder()
            .status(code)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn ok(body: Value) -> Response<Body> {
        Response::builder()
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn workload(kind: &str, name: &str, selector: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": kind,
            "metadata": { "name": name, "namespace": "prod" },
            "spec": { "selector": selector, "serviceName": name, "template": {} },
        })
    }

    fn label_selector(uri: &Uri) -> Option<String> {
        url::form_urlencoded::parse(uri.query()?.as_bytes())
            .find(|(key, _)| key == "labelSelector")
            .map(|(_, value)| value.into_owned())
    }

    /// Canned API server responses keyed on the request path
    fn route(uri: &Uri) -> Response<Body> {
        let path = uri.path();
        if path.starts_with("/api/v1/namespaces/broken/") {
            return status(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "etcd unavailable");
        }

        match path {
            "/api/v1/namespaces/prod/services/api" => ok(json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": "api", "namespace": "prod" },
                "spec": { "selector": { "app": "api" } },
            })),
            "/api/v1/namespaces/prod/services/headless" => ok(json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "name": "headless", "namespace": "prod" },
                "spec": {},
            })),
            "/apis/apps/v1/namespaces/prod/deployments/api" => ok(workload(
                "Deployment",
                "api",
                json!({
                    "matchLabels": { "app": "api" },
                    "matchExpressions": [
                        { "key": "tier", "operator": "In", "values": ["backend", "edge"] },
                    ],
                }),
            )),
            "/apis/apps/v1/namespaces/prod/statefulsets/db" => {
                ok(workload("StatefulSet", "db", json!({ "matchLabels": { "app": "db" } })))
            }
            "/apis/apps/v1/namespaces/prod/daemonsets/agent" => ok(workload(
                "DaemonSet",
                "agent",
                json!({ "matchExpressions": [{ "key": "agent", "operator": "Exists" }] }),
            )),
            "/apis/apps/v1/namespaces/prod/replicasets/api-7d9f" => ok(workload(
                "ReplicaSet",
                "api-7d9f",
                json!({ "matchLabels": { "app": "api", "pod-template-hash": "7d9f" } }),
            )),
            "/api/v1/namespaces/prod/pods" => {
                let items = match label_selector(uri).as_deref() {
                    Some("app=api") => json!([
                        { "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "api-1", "namespace": "prod" } },
                        { "apiVersion": "v1", "kind": "Pod", "metadata": { "name": "api-2", "namespace": "prod" } },
                    ]),
                    _ => json!([]),
                };
                ok(json!({
                    "apiVersion": "v1",
                    "kind": "PodList",
                    "metadata": { "resourceVersion": "1" },
                    "items": items,
                }))
            }
            "/api/v1/namespaces/prod/pods/api-0" => ok(json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": { "name": "api-0", "namespace": "prod" },
                "status": { "phase": "Pending" },
            })),
            _ => status(StatusCode::NOT_FOUND, "NotFound", "not found"),
        }
    }

    fn cluster() -> KubeCluster {
        let service = tower::service_fn(|req: Request<Body>| {
            let response = route(req.uri());
            async move { Ok::<_, Infallible>(response) }
        });
        KubeCluster::new(Client::new(service, "default"))
    }

    #[tokio::test]
    async fn test_selector_per_kind() {
        let cluster = cluster();
        let cases = [
            (ResourceKind::Service, "api", "app=api"),
            (ResourceKind::Deployment, "api", "app=api,tier in (backend,edge)"),
            (ResourceKind::StatefulSet, "db", "app=db"),
            (ResourceKind::DaemonSet, "agent", "agent"),
            (ResourceKind::ReplicaSet, "api-7d9f", "app=api,pod-template-hash=7d9f"),
        ];

        for (kind, name, expected) in cases {
            let selector = cluster.selector_for(kind, "prod", name).await.unwrap();
            assert_eq!(selector.to_string(), expected, "{} {}", kind, name);
        }
    }

    #[tokio::test]
    async fn test_service_without_selector() {
        let selector = cluster()
            .selector_for(ResourceKind::Service, "prod", "headless")
            .await
            .unwrap();
        assert!(selector.is_empty());
    }

    #[tokio::test]
    async fn test_pod_kind_has_no_selector() {
        assert!(matches!(
            cluster().selector_for(ResourceKind::Pod, "prod", "api-0").await,
            Err(KurlError::ClusterApi(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        match cluster().selector_for(ResourceKind::Deployment, "prod", "ghost").await {
            Err(KurlError::ResourceNotFound { kind, namespace, name }) => {
                assert_eq!(kind, ResourceKind::Deployment);
                assert_eq!(namespace, "prod");
                assert_eq!(name, "ghost");
            }
            other => panic!("expected ResourceNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_cluster_api() {
        match cluster().selector_for(ResourceKind::Service, "broken", "api").await {
            Err(KurlError::ClusterApi(msg)) => assert!(msg.contains("etcd unavailable"), "{}", msg),
            other => panic!("expected ClusterApi, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_pods_sends_selector() {
        let cluster = cluster();
        let selector = cluster.selector_for(ResourceKind::Service, "prod", "api").await.unwrap();

        let pods = cluster.list_pods("prod", &selector).await.unwrap();
        assert_eq!(pods, vec!["api-1", "api-2"]);

        let selector = cluster.selector_for(ResourceKind::StatefulSet, "prod", "db").await.unwrap();
        assert!(cluster.list_pods("prod", &selector).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_requires_running_pod() {
        let cluster = cluster();

        let pending = TargetDescriptor::new("prod", "api-0", ResourceKind::Pod, 8080);
        match cluster.connect(&pending).await {
            Err(KurlError::TunnelConnect(msg)) => {
                assert!(msg.contains("not running"), "{}", msg);
                assert!(msg.contains("Pending"), "{}", msg);
            }
            other => panic!("expected TunnelConnect, got {:?}", other),
        }

        let missing = TargetDescriptor::new("prod", "api-9", ResourceKind::Pod, 8080);
        match cluster.connect(&missing).await {
            Err(KurlError::TunnelConnect(msg)) => assert!(msg.contains("not found"), "{}", msg),
            other => panic!("expected TunnelConnect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_warm_forward_without_connect() {
        let target = TargetDescriptor::new("prod", "api-1", ResourceKind::Pod, 8080);
        assert!(cluster().take_warm(&target).unwrap().is_none());
    }

    #[test]
    fn test_forward_key_matches_namespace_pod_and_port() {
        let key = ForwardKey::from(&TargetDescriptor::new("prod", "api-1", ResourceKind::Pod, 8080));

        assert_eq!(key, ForwardKey::from(&TargetDescriptor::new("prod", "api-1", ResourceKind::Pod, 8080)));
        assert_ne!(key, ForwardKey::from(&TargetDescriptor::new("prod", "api-1", ResourceKind::Pod, 9090)));
        assert_ne!(key, ForwardKey::from(&TargetDescriptor::new("prod", "api-2", ResourceKind::Pod, 8080)));
        assert_ne!(key, ForwardKey::from(&TargetDescriptor::new("staging", "api-1", ResourceKind::Pod, 8080)));
    }
}
