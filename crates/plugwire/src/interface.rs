use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use serde_json::Value;

use crate::error::{ChannelError, RecvError};
use crate::wire::WorkerFrame;

/// What a plugin sees on its event channel. The shutdown sentinel is a
/// distinct variant, not a payload, so a plugin cannot mistake it for data.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Event(Value),
    Shutdown,
}

/// The façade a plugin runs against: its only connection to the host.
///
/// Created once per worker process and handed to the plugin for its whole
/// lifetime. Sends never block; receives come in blocking, non-blocking and
/// timed flavours. There is no backpressure at this layer.
pub struct PluginInterface {
    events: Receiver<WorkerEvent>,
    out: Sender<WorkerFrame>,
}

impl PluginInterface {
    /// Assemble an interface from raw channel endpoints. The runtime does
    /// this for you; it is public so plugins can be unit tested without a
    /// host process.
    pub fn from_parts(events: Receiver<WorkerEvent>, out: Sender<WorkerFrame>) -> Self {
        Self { events, out }
    }

    /// Enqueue a message for the host's message handler.
    pub fn send(&self, message: Value) -> Result<(), ChannelError> {
        self.out
            .send(WorkerFrame::Message { payload: message })
            .map_err(|_| ChannelError::Closed)
    }

    /// Wait indefinitely for the next event.
    pub fn recv(&self) -> Result<WorkerEvent, ChannelError> {
        self.events.recv().map_err(|_| ChannelError::Closed)
    }

    /// Return immediately, failing with [`RecvError::WouldBlock`] if nothing
    /// is queued.
    pub fn try_recv(&self) -> Result<WorkerEvent, RecvError> {
        self.events.try_recv().map_err(|e| match e {
            TryRecvError::Empty => RecvError::WouldBlock,
            TryRecvError::Disconnected => RecvError::Closed,
        })
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<WorkerEvent, RecvError> {
        self.events.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => RecvError::Timeout,
            RecvTimeoutError::Disconnected => RecvError::Closed,
        })
    }
}
