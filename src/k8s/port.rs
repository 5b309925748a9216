//! Local port allocation

use std::net::TcpListener;

use crate::errors::KurlError;

/// Find an available local port
///
/// Binds to port 0 so the OS picks a free port, then releases it. Another
/// process could claim the port before the tunnel binds it; that window is
/// accepted.
pub fn allocate_local_port() -> Result<u16, KurlError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| KurlError::Allocation(format!("failed to bind ephemeral port: {}", e)))?;

    let port = listener.local_addr()
        .map_err(|e| KurlError::Allocation(format!("failed to get local address: {}", e)))?
        .port();

    drop(listener);

    Ok(port)
}
