//! CLI command implementations.

pub mod acls;
pub mod demo;

use std::sync::Arc;
use vtsync_engine::{Client, ClientConfig, LoopbackTransport, MemoryRevisionStore};
use vtsync_server::SyncServer;

/// Connects a client to an in-process server.
pub fn connect(server: &Arc<SyncServer>, config: ClientConfig) -> Client {
    let server = Arc::clone(server);
    let transport = Arc::new(LoopbackTransport::new(
        move |body: &[u8]| -> Result<Vec<u8>, String> {
            server.handle_bytes(body).map_err(|e| e.to_string())
        },
    ));
    let client = Client::connect(
        config,
        transport.clone(),
        Arc::new(MemoryRevisionStore::new()),
    );
    transport.attach(client.context());
    client
}
