//! Kubernetes port-forward sessions
//!
//! A [`TunnelSession`] owns a local listening port and relays every
//! connection accepted on it to a container port of a single pod. The session
//! runs as a background task and moves through
//! `Connecting -> Ready -> Forwarding -> Closed`.
//!
//! # Example
//! ```no_run
//! # async fn demo(
//! #     transport: std::sync::Arc<dyn kurl::k8s::TunnelTransport>,
//! #     target: kurl::k8s::TargetDescriptor,
//! # ) -> kurl::errors::Result<()> {
//! use kurl::k8s::{allocate_local_port, TunnelSession};
//!
//! let port = allocate_local_port()?;
//! let mut session = TunnelSession::open(transport, target, port)?;
//! session.ready().await?;
//! // ... issue requests against localhost:<port> ...
//! session.cancel_handle().cancel();
//! session.wait().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::KurlError;
use super::target::TargetDescriptor;

/// Byte stream to a pod port
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// One multiplexed stream to a pod port
///
/// `done` resolves once the stream has been dropped and the underlying
/// tunnel has shut down; an error there means the tunnel itself broke.
pub struct PodStream {
    io: Box<dyn TunnelStream>,
    done: BoxFuture<'static, Result<(), KurlError>>,
}

impl PodStream {
    pub fn new<S, F>(io: S, done: F) -> Self
    where
        S: TunnelStream + 'static,
        F: Future<Output = Result<(), KurlError>> + Send + 'static,
    {
        Self {
            io: Box::new(io),
            done: done.boxed(),
        }
    }

    /// A stream with no separate tunnel to wait on
    pub fn detached<S>(io: S) -> Self
    where
        S: TunnelStream + 'static,
    {
        Self::new(io, futures::future::ok(()))
    }
}

/// Cluster transport able to reach pod ports
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    /// Establish the tunnel to the pod; called once before the session is ready
    async fn connect(&self, target: &TargetDescriptor) -> Result<(), KurlError>;

    /// Open a stream to `target.port()` for one local connection
    async fn open_stream(&self, target: &TargetDescriptor) -> Result<PodStream, KurlError>;
}

/// Lifecycle of a tunnel session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Forwarding,
    Closed,
}

/// Stops a tunnel session; cancelling more than once is a no-op
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A running port-forward from a local port to a pod
#[derive(Debug)]
pub struct TunnelSession {
    local_port: u16,
    target: TargetDescriptor,
    cancel: CancelHandle,
    ready_rx: Option<oneshot::Receiver<()>>,
    state_rx: watch::Receiver<SessionState>,
    task: Option<JoinHandle<Result<(), KurlError>>>,
}

impl TunnelSession {
    /// Start forwarding `local_port` to the pod named by `target`
    ///
    /// The target must already be resolved to a pod. Must be called from
    /// within a tokio runtime.
    pub fn open(
        transport: Arc<dyn TunnelTransport>,
        target: TargetDescriptor,
        local_port: u16,
    ) -> Result<Self, KurlError> {
        if !target.kind().is_pod() {
            return Err(KurlError::UnresolvedTarget {
                kind: target.kind(),
                name: target.name().to_string(),
            });
        }

        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let task = tokio::spawn(run_session(
            transport,
            target.clone(),
            local_port,
            ready_tx,
            state_tx,
            token.clone(),
        ));

        Ok(Self {
            local_port,
            target,
            cancel: CancelHandle { token },
            ready_rx: Some(ready_rx),
            state_rx,
            task: Some(task),
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait until the local port accepts connections
    ///
    /// Returns the session's error if it closed before becoming ready, and
    /// `TunnelBroken` once the session has closed after being ready.
    pub async fn ready(&mut self) -> Result<(), KurlError> {
        if let Some(ready_rx) = self.ready_rx.take() {
            if ready_rx.await.is_err() {
                self.join().await?;
                return Err(KurlError::TunnelConnect(
                    "session closed before becoming ready".to_string(),
                ));
            }
        }

        match self.state() {
            SessionState::Closed => Err(KurlError::TunnelBroken(format!(
                "session on local port {} is closed", self.local_port
            ))),
            _ => Ok(()),
        }
    }

    /// Wait until the session reaches `Closed`, for any reason
    pub async fn closed(&mut self) {
        let _ = self
            .state_rx
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }

    /// Wait for the session task to finish and return its outcome
    pub async fn wait(mut self) -> Result<(), KurlError> {
        self.join().await
    }

    async fn join(&mut self) -> Result<(), KurlError> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| KurlError::TunnelBroken(format!("port-forward task failed: {}", e)))?,
            None => Ok(()),
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_session(
    transport: Arc<dyn TunnelTransport>,
    target: TargetDescriptor,
    local_port: u16,
    ready_tx: oneshot::Sender<()>,
    state_tx: watch::Sender<SessionState>,
    token: CancellationToken,
) -> Result<(), KurlError> {
    let result = forward(transport, &target, local_port, ready_tx, &state_tx, &token).await;
    state_tx.send_replace(SessionState::Closed);

    match &result {
        Ok(()) => debug!(local_port, target = %target, "Port-forward closed"),
        Err(e) => warn!(local_port, target = %target, error = %e, "Port-forward failed"),
    }
    result
}

async fn forward(
    transport: Arc<dyn TunnelTransport>,
    target: &TargetDescriptor,
    local_port: u16,
    ready_tx: oneshot::Sender<()>,
    state_tx: &watch::Sender<SessionState>,
    token: &CancellationToken,
) -> Result<(), KurlError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => return Ok(()),
        connected = transport.connect(target) => connected.map_err(into_connect_error)?,
    }

    let listener = TcpListener::bind(("127.0.0.1", local_port))
        .await
        .map_err(|e| KurlError::TunnelConnect(format!(
            "failed to listen on local port {}: {}", local_port, e
        )))?;

    state_tx.send_replace(SessionState::Ready);
    let _ = ready_tx.send(());
    info!(local_port, target = %target, "Port-forward ready");

    let (failure_tx, mut failure_rx) = mpsc::channel::<KurlError>(1);
    let mut relays = JoinSet::new();

    let result = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break Ok(()),
            Some(err) = failure_rx.recv() => break Err(err),
            accepted = listener.accept() => {
                let (conn, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => break Err(KurlError::TunnelBroken(format!(
                        "failed to accept on local port {}: {}", local_port, e
                    ))),
                };
                state_tx.send_if_modified(|state| {
                    if *state == SessionState::Ready {
                        *state = SessionState::Forwarding;
                        true
                    } else {
                        false
                    }
                });
                relays.spawn(relay(
                    transport.clone(),
                    target.clone(),
                    conn,
                    peer,
                    failure_tx.clone(),
                ));
            }
            Some(joined) = relays.join_next(), if !relays.is_empty() => {
                if let Err(e) = joined {
                    warn!(local_port, error = %e, "Relay task failed");
                }
            }
        }
    };

    relays.shutdown().await;
    drop(listener);
    result
}

/// Relay one local connection through its own pod stream
async fn relay(
    transport: Arc<dyn TunnelTransport>,
    target: TargetDescriptor,
    mut conn: TcpStream,
    peer: SocketAddr,
    failures: mpsc::Sender<KurlError>,
) {
    debug!(%peer, pod = target.name(), "Accepted local connection");

    let PodStream { mut io, done } = match transport.open_stream(&target).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = failures.send(into_broken_error(e)).await;
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut conn, &mut io).await {
        Ok((sent, received)) => debug!(%peer, sent, received, "Local connection finished"),
        // The client hanging up mid-transfer is not a tunnel failure
        Err(e) => debug!(%peer, error = %e, "Local connection ended with error"),
    }
    drop(io);

    if let Err(e) = done.await {
        let _ = failures.send(into_broken_error(e)).await;
    }
}

fn into_connect_error(err: KurlError) -> KurlError {
    match err {
        KurlError::TunnelConnect(_) => err,
        other => KurlError::TunnelConnect(other.to_string()),
    }
}

fn into_broken_error(err: KurlError) -> KurlError {
    match err {
        KurlError::TunnelBroken(_) => err,
        other => KurlError::TunnelBroken(other.to_string()),
    }
}
