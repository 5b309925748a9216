//! Common test utilities for kurl integration tests
//!
//! This module provides shared test infrastructure including:
//! - An in-memory cluster implementing both cluster capabilities
//! - Local TCP echo servers standing in for pod ports
//! - CLI invocation helpers

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use kurl::errors::KurlError;
use kurl::k8s::{
    ClusterQuery, PodStream, ResourceKind, Selector, TargetDescriptor, TunnelTransport,
};

/// Start a TCP server that echoes every byte back; returns its address
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind echo server");
    let addr = listener.local_addr().expect("echo server address");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Send `payload` through `localhost:port`, half-close, and read everything back
pub async fn roundtrip(port: u16, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect to local port");
    stream.write_all(payload).await.expect("write payload");
    stream.shutdown().await.expect("half-close");

    let mut received = Vec::new();
    stream.read_to_end(&mut received).await.expect("read echo");
    received
}

struct FakePod {
    namespace: String,
    name: String,
    labels: BTreeMap<String, String>,
    running: bool,
}

/// In-memory cluster
///
/// Every pod stream is connected to `upstream`, so a pod port behaves like
/// the echo server it points at.
pub struct FakeCluster {
    workloads: HashMap<(ResourceKind, String, String), Selector>,
    pods: Vec<FakePod>,
    upstream: Option<SocketAddr>,
    stream_limit: Option<usize>,
    connects: AtomicUsize,
    streams: AtomicUsize,
    list_calls: Mutex<Vec<String>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            workloads: HashMap::new(),
            pods: Vec::new(),
            upstream: None,
            stream_limit: None,
            connects: AtomicUsize::new(0),
            streams: AtomicUsize::new(0),
            list_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pod(mut self, namespace: &str, name: &str, labels: &[(&str, &str)]) -> Self {
        self.pods.push(FakePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
            labels: to_map(labels),
            running: true,
        });
        self
    }

    pub fn with_pending_pod(mut self, namespace: &str, name: &str) -> Self {
        self.pods.push(FakePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
            labels: BTreeMap::new(),
            running: false,
        });
        self
    }

    pub fn with_workload(
        mut self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        selector: &[(&str, &str)],
    ) -> Self {
        self.workloads.insert(
            (kind, namespace.to_string(), name.to_string()),
            Selector::from_labels(&to_map(selector)),
        );
        self
    }

    pub fn with_upstream(mut self, addr: SocketAddr) -> Self {
        self.upstream = Some(addr);
        self
    }

    /// Fail every stream after the first `limit`, as if the tunnel dropped
    pub fn break_after(mut self, limit: usize) -> Self {
        self.stream_limit = Some(limit);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }

    /// Selectors passed to `list_pods`, rendered as strings
    pub fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[async_trait]
impl ClusterQuery for FakeCluster {
    async fn selector_for(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Selector, KurlError> {
        self.workloads
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| KurlError::ResourceNotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list_pods(&self, namespace: &str, selector: &Selector) -> Result<Vec<String>, KurlError> {
        self.list_calls.lock().unwrap().push(selector.to_string());
        Ok(self
            .pods
            .iter()
            .filter(|pod| pod.namespace == namespace && selector.matches(&pod.labels))
            .map(|pod| pod.name.clone())
            .collect())
    }
}

#[async_trait]
impl TunnelTransport for FakeCluster {
    async fn connect(&self, target: &TargetDescriptor) -> Result<(), KurlError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let pod = self
            .pods
            .iter()
            .find(|pod| pod.namespace == target.namespace() && pod.name == target.name())
            .ok_or_else(|| KurlError::TunnelConnect(format!(
                "pod {} not found in namespace {}", target.name(), target.namespace()
            )))?;

        if !pod.running {
            return Err(KurlError::TunnelConnect(format!("pod {} is not running", pod.name)));
        }
        Ok(())
    }

    async fn open_stream(&self, target: &TargetDescriptor) -> Result<PodStream, KurlError> {
        let opened = self.streams.fetch_add(1, Ordering::SeqCst);
        if self.stream_limit.is_some_and(|limit| opened >= limit) {
            return Err(KurlError::TunnelBroken(format!("lost connection to pod {}", target.name())));
        }

        let upstream = self
            .upstream
            .ok_or_else(|| KurlError::TunnelBroken("no upstream configured".to_string()))?;
        let stream = TcpStream::connect(upstream).await?;
        Ok(PodStream::detached(stream))
    }
}

/// Exit status codes matching the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    Error = 1,
    Interrupted = 130,
}

impl From<i32> for ExitStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => ExitStatus::Success,
            130 => ExitStatus::Interrupted,
            _ => ExitStatus::Error,
        }
    }
}

/// Result of running the kurl binary
#[derive(Debug)]
pub struct CliResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: ExitStatus,
    pub exit_code: i32,
}

/// Isolated environment for running the binary
pub struct MockEnvironment {
    /// Temporary config directory
    pub config_dir: TempDir,
    /// Environment variables to set
    pub env_vars: HashMap<String, String>,
}

impl Default for MockEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEnvironment {
    pub fn new() -> Self {
        let config_dir = TempDir::new().expect("Failed to create temp config dir");
        let mut env_vars = HashMap::new();
        // Never touch a real cluster from tests
        env_vars.insert(
            "KUBECONFIG".to_string(),
            config_dir.path().join("missing-kubeconfig").display().to_string(),
        );
        Self { config_dir, env_vars }
    }

    pub fn set_env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env_vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().to_path_buf()
    }

    /// Write `config.toml` into the config directory
    pub fn write_config(&self, content: &str) {
        std::fs::write(self.config_path().join("config.toml"), content).expect("write config");
    }
}

/// Run kurl with the given arguments in a fresh environment
pub fn kurl(args: &[&str]) -> CliResponse {
    kurl_with_env(args, &MockEnvironment::new())
}

/// Run kurl with the given arguments and environment
pub fn kurl_with_env(args: &[&str], env: &MockEnvironment) -> CliResponse {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kurl"));
    cmd.args(args);

    cmd.env("KURL_CONFIG_DIR", env.config_path());
    cmd.env_remove("KURL_CONTEXT");
    cmd.env_remove("KURL_LOG");
    cmd.env_remove("KUBERNETES_SERVICE_HOST");
    for (key, value) in &env.env_vars {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().expect("Failed to execute command");
    parse_output(output)
}

fn parse_output(output: Output) -> CliResponse {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(1);

    CliResponse {
        stdout,
        stderr,
        exit_status: ExitStatus::from(exit_code),
        exit_code,
    }
}
