//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use vtsync_protocol::{Request, RequestKind, Response};

/// Continuation invoked with the outcome of a sent request.
pub type Completion = Box<dyn FnOnce(SyncResult<Response>) + Send + 'static>;

/// A transport handles network communication with the server.
///
/// This trait abstracts the connection, framing and reconnect policy. The
/// engine only hands it requests and waits for the continuation.
pub trait Transport: Send + Sync {
    /// Dispatches a request.
    ///
    /// `completion` is invoked at most once, with either the server's
    /// response or a transport error. It may run on any thread, and may run
    /// before `send` returns. A request lost while disconnected may drop its
    /// completion; the operation is resent on reconnect or timeout.
    fn send(&self, request: Request, completion: Completion);

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
///
/// Requests are answered from responses scripted per request kind. A request
/// with no scripted response is held until [`MockTransport::respond_next`]
/// or [`MockTransport::fail_next`] is called.
pub struct MockTransport {
    connected: AtomicBool,
    sent: Mutex<Vec<Request>>,
    scripted: Mutex<HashMap<RequestKind, VecDeque<SyncResult<Response>>>>,
    pending: Mutex<VecDeque<(Request, Completion)>>,
}

impl MockTransport {
    /// Creates a new, connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            scripted: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a response for the next request of `kind`.
    pub fn script(&self, kind: RequestKind, response: SyncResult<Response>) {
        self.scripted
            .lock()
            .entry(kind)
            .or_default()
            .push_back(response);
    }

    /// Queues a successful response, keyed by its own kind.
    pub fn script_response(&self, response: Response) {
        self.script(response.kind(), Ok(response));
    }

    /// Completes the oldest held request with `response`.
    ///
    /// Returns false if no request was held.
    pub fn respond_next(&self, response: Response) -> bool {
        self.complete_next(Ok(response))
    }

    /// Completes the oldest held request with a transport error.
    pub fn fail_next(&self, error: SyncError) -> bool {
        self.complete_next(Err(error))
    }

    fn complete_next(&self, result: SyncResult<Response>) -> bool {
        let next = self.pending.lock().pop_front();
        match next {
            Some((_, completion)) => {
                completion(result);
                true
            }
            None => false,
        }
    }

    /// Returns every request sent so far, in order.
    pub fn sent_requests(&self) -> Vec<Request> {
        self.sent.lock().clone()
    }

    /// Returns the number of requests sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns the number of requests waiting for a manual response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: Request, completion: Completion) {
        self.sent.lock().push(request.clone());

        let scripted = self
            .scripted
            .lock()
            .get_mut(&request.kind())
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(result) => completion(result),
            None => self.pending.lock().push_back((request, completion)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
