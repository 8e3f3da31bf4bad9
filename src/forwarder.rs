use std::sync::Arc;

use plugwire::wire::{LogLevel, LogRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// What travels over the manager's shared log channel. `Shutdown` is the
/// forwarder's own sentinel, distinct from the per-plugin event sentinel.
#[derive(Debug)]
pub enum LogEvent {
    Record { plugin: String, record: LogRecord },
    Shutdown,
}

/// Host-side destination for forwarded worker log records. The default
/// re-emits through `tracing`; tests substitute a capturing sink.
pub trait LogSink: Send + Sync {
    fn emit(&self, plugin: &str, record: &LogRecord);
}

/// Re-emits each record at its original level, attributed to its original
/// target, so host-side filters treat it exactly like a local log call.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, plugin: &str, record: &LogRecord) {
        let message = match &record.error {
            Some(err) => format!("{} ({err})", record.message),
            None => record.message.clone(),
        };
        match record.level {
            LogLevel::Trace => trace!(plugin, logger = %record.target, "{message}"),
            LogLevel::Debug => debug!(plugin, logger = %record.target, "{message}"),
            LogLevel::Info => info!(plugin, logger = %record.target, "{message}"),
            LogLevel::Warn => warn!(plugin, logger = %record.target, "{message}"),
            LogLevel::Error => error!(plugin, logger = %record.target, "{message}"),
        }
    }
}

/// One shared log channel per manager plus the background consumer draining
/// it. Every worker's stdout pump holds a clone of the sender; records are
/// re-emitted in arrival order, with no interleaving guarantee across
/// workers.
pub struct LogForwarder {
    tx: mpsc::UnboundedSender<LogEvent>,
    task: JoinHandle<()>,
}

impl LogForwarder {
    pub fn spawn(sink: Arc<dyn LogSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    LogEvent::Record { plugin, record } => sink.emit(&plugin, &record),
                    LogEvent::Shutdown => break,
                }
            }
        });
        Self { tx, task }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<LogEvent> {
        self.tx.clone()
    }

    /// Deliver the shutdown sentinel and wait for the consumer to drain
    /// everything queued before it.
    pub async fn shutdown(self) {
        let _ = self.tx.send(LogEvent::Shutdown);
        let _ = self.task.await;
    }
}
