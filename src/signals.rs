//! Ctrl+C handling
//!
//! The handler runs on its own thread, outside the tokio runtime. It records
//! the interrupt and cancels whichever tunnel is currently registered so the
//! local port is released before the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::k8s::CancelHandle;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

static ACTIVE_TUNNEL: Mutex<Option<CancelHandle>> = Mutex::new(None);

/// Check if the application was interrupted (Ctrl+C pressed)
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Record an interrupt and stop the registered tunnel, if any
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
    if let Ok(active) = ACTIVE_TUNNEL.lock() {
        if let Some(handle) = active.as_ref() {
            handle.cancel();
        }
    }
}

#[inline]
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Register the tunnel to stop on interrupt, replacing any previous one
///
/// If an interrupt already arrived the handle is cancelled immediately.
pub fn register_tunnel(handle: CancelHandle) {
    if was_interrupted() {
        handle.cancel();
    }
    if let Ok(mut active) = ACTIVE_TUNNEL.lock() {
        *active = Some(handle);
    }
}

pub fn clear_tunnel() {
    if let Ok(mut active) = ACTIVE_TUNNEL.lock() {
        active.take();
    }
}
