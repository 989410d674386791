//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, PublishRequest, RequestHandler};
use crate::value_log::ValueLog;
use std::sync::Arc;
use tracing::{debug, warn};
use vtsync_protocol::{AclSet, Key, Request, Response, ValueRecord, Vts};

/// The sync server.
///
/// This server answers every request kind of the vtsync protocol from an
/// in-memory value log. Rejected requests are answered with
/// [`Response::Error`] rather than failing the call.
///
/// # Example
///
/// ```
/// use vtsync_protocol::{Key, Request, Response};
/// use vtsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let response = server.handle(Request::Subscribe {
///     key: Key::new("room/5"),
/// });
/// assert_eq!(response, Response::Subscribed);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_log(config, Arc::new(ValueLog::new()))
    }

    /// Creates a sync server over an existing log.
    pub fn with_log(config: ServerConfig, log: Arc<ValueLog>) -> Self {
        let context = Arc::new(HandlerContext::new(config, log));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a request, answering rejections with an error response.
    pub fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        let result = match request {
            Request::Publish {
                key,
                data,
                delete,
                created_at_ms,
                acl_id,
            } => self.handler.handle_publish(PublishRequest {
                key,
                data,
                delete,
                created_at_ms,
                acl_id,
            }),
            Request::Subscribe { key } => self.handler.handle_subscribe(key),
            Request::Unsubscribe { key } => self.handler.handle_unsubscribe(key),
            Request::GetAcls => self.handler.handle_get_acls(),
            Request::Advance { key, since } => self.handler.handle_advance(key, since),
            Request::Fetch { key, revisions } => self.handler.handle_fetch(key, revisions),
        };

        result.unwrap_or_else(|e| {
            if e.is_client_error() {
                debug!(%kind, error = %e, "request rejected");
            } else {
                warn!(%kind, error = %e, "request failed");
            }
            Response::error(kind, e.to_string())
        })
    }

    /// Handles an encoded request, returning the encoded response.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be decoded or the response encoded.
    pub fn handle_bytes(&self, body: &[u8]) -> ServerResult<Vec<u8>> {
        let request = Request::decode(body)?;
        self.handle(request).encode().map_err(ServerError::from)
    }

    /// Returns the server clock.
    pub fn clock(&self) -> Vts {
        self.context.log.clock()
    }

    /// Returns the number of stored revisions.
    pub fn revision_count(&self) -> usize {
        self.context.log.len()
    }

    /// Returns the latest revision of a concrete key.
    pub fn latest(&self, key: &Key) -> Option<ValueRecord> {
        self.context.log.latest(key)
    }

    /// Returns the subscribed keys.
    pub fn subscriptions(&self) -> Vec<Key> {
        self.context.subscriptions()
    }

    /// Replaces the ACL set served to clients.
    pub fn set_acls(&self, acls: AclSet) {
        self.context.set_acls(acls);
    }
}
