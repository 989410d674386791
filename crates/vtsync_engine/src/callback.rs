//! Serial context for delivering callbacks to application code.

use tokio::sync::mpsc;
use tracing::debug;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs application callbacks one at a time, in submission order.
///
/// Callbacks never run on the transport or timer contexts, so handlers do
/// not have to be reentrant with respect to each other.
#[derive(Clone)]
pub struct CallbackQueue {
    sender: mpsc::UnboundedSender<Callback>,
}

impl CallbackQueue {
    /// Creates the queue and spawns its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Callback>();
        tokio::spawn(async move {
            while let Some(callback) = receiver.recv().await {
                callback();
            }
            debug!("callback queue closed");
        });
        Self { sender }
    }

    /// Schedules a callback.
    pub fn dispatch(&self, callback: impl FnOnce() + Send + 'static) {
        if self.sender.send(Box::new(callback)).is_err() {
            debug!("callback dropped, queue worker has stopped");
        }
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}
