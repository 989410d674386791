//! In-process transport.
//!
//! Requests go through the same CBOR encoding a network transport would
//! use, then straight to a server in the same process. Useful for tests and
//! for running a client and server together.

use crate::context::ClientContext;
use crate::error::SyncError;
use crate::transport::{Completion, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, trace};
use vtsync_protocol::{Request, Response};

/// A server answering encoded requests with encoded responses.
pub trait LoopbackServer: Send + Sync {
    /// Handles one encoded request.
    fn handle_bytes(&self, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<F> LoopbackServer for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, String> + Send + Sync,
{
    fn handle_bytes(&self, body: &[u8]) -> Result<Vec<u8>, String> {
        self(body)
    }
}

/// Transport delivering requests to an in-process [`LoopbackServer`].
///
/// Each request is answered on its own tokio task. While disconnected,
/// requests are dropped, as they would be on a broken connection; the
/// attached context resends them on reconnect.
pub struct LoopbackTransport {
    server: Arc<dyn LoopbackServer>,
    handle: Handle,
    connected: AtomicBool,
    context: Mutex<Weak<ClientContext>>,
}

impl LoopbackTransport {
    /// Creates a connected transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(server: impl LoopbackServer + 'static) -> Self {
        Self {
            server: Arc::new(server),
            handle: Handle::current(),
            connected: AtomicBool::new(true),
            context: Mutex::new(Weak::new()),
        }
    }

    /// Attaches the context notified on reconnect.
    pub fn attach(&self, context: &Arc<ClientContext>) {
        *self.context.lock() = Arc::downgrade(context);
    }

    /// Sets the connected state. Going from disconnected to connected
    /// notifies the attached context.
    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if connected && !was {
            let context = self.context.lock().upgrade();
            debug!(attached = context.is_some(), "loopback reconnected");
            if let Some(context) = context {
                context.handle_connect();
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, request: Request, completion: Completion) {
        if !self.is_connected() {
            debug!(kind = %request.kind(), "request dropped, loopback disconnected");
            return;
        }

        let body = match request.encode() {
            Ok(body) => body,
            Err(e) => {
                completion(Err(e.into()));
                return;
            }
        };

        let server = Arc::clone(&self.server);
        let kind = request.kind();
        self.handle.spawn(async move {
            let result = server
                .handle_bytes(&body)
                .map_err(|e| SyncError::transport_retryable(e))
                .and_then(|reply| Response::decode(&reply).map_err(SyncError::from));
            trace!(%kind, ok = result.is_ok(), "loopback reply");
            completion(result);
        });
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
