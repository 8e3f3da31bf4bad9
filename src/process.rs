use std::io;

use async_trait::async_trait;
use plugwire::wire::{self, HostFrame, WorkerFrame};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::ManagerError;
use crate::forwarder::LogEvent;

/// The manager's view of a spawned worker: exactly what the stop escalation
/// and the reaper need, nothing else. `tokio::process::Child` is the real
/// implementation; tests substitute processes with scripted lifetimes.
#[async_trait]
pub trait WorkerProcess: Send {
    /// Wait for the process to exit. The stop path bounds this with the
    /// configured grace period.
    async fn wait(&mut self) -> io::Result<()>;
    /// Deliver the termination signal without waiting.
    fn start_kill(&mut self) -> io::Result<()>;
    /// Poll liveness: `Ok(true)` once the process has exited.
    fn try_wait(&mut self) -> io::Result<bool>;
}

#[async_trait]
impl WorkerProcess for Child {
    async fn wait(&mut self) -> io::Result<()> {
        Child::wait(self).await.map(|_| ())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        Child::start_kill(self)
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        Ok(Child::try_wait(self)?.is_some())
    }
}

/// Writing end of one plugin's event channel. Cheap to clone; frames are
/// relayed to the worker's stdin by a background task.
#[derive(Clone)]
pub struct EventSender {
    plugin: String,
    tx: mpsc::UnboundedSender<HostFrame>,
}

impl EventSender {
    pub fn send(&self, payload: Value) -> Result<(), ManagerError> {
        self.tx
            .send(HostFrame::Event { payload })
            .map_err(|_| ManagerError::ChannelClosed(self.plugin.clone()))
    }

    /// Push the shutdown sentinel onto the event channel.
    pub fn send_shutdown(&self) -> Result<(), ManagerError> {
        self.tx
            .send(HostFrame::Shutdown)
            .map_err(|_| ManagerError::ChannelClosed(self.plugin.clone()))
    }

    #[cfg(test)]
    pub(crate) fn for_test(plugin: &str) -> (Self, mpsc::UnboundedReceiver<HostFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { plugin: plugin.to_string(), tx }, rx)
    }
}

/// Wire a freshly spawned worker's stdio into the manager's channels: events
/// out over stdin, messages and log records in over stdout.
///
/// The writer task ends when the [`EventSender`] side is dropped; the reader
/// task ends at stdout EOF. Neither outlives the registry entry by more than
/// the pipe's remaining buffered contents.
pub(crate) fn spawn_io(
    plugin: &str,
    stdin: ChildStdin,
    stdout: ChildStdout,
    log_tx: mpsc::UnboundedSender<LogEvent>,
) -> (EventSender, mpsc::UnboundedReceiver<Value>) {
    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<HostFrame>();
    let (msg_tx, msg_rx) = mpsc::unbounded_channel::<Value>();

    let name = plugin.to_string();
    tokio::spawn(async move {
        let mut stdin = stdin;
        while let Some(frame) = ev_rx.recv().await {
            let line = match wire::to_line(&frame) {
                Ok(line) => line,
                Err(e) => {
                    warn!(plugin = %name, error = %e, "could not serialise event frame");
                    continue;
                }
            };
            if stdin.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdin.flush().await.is_err() {
                break;
            }
        }
    });

    let name = plugin.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match wire::parse_line::<WorkerFrame>(&line) {
                Ok(WorkerFrame::Message { payload }) => {
                    if msg_tx.send(payload).is_err() {
                        break;
                    }
                }
                Ok(WorkerFrame::Log { record }) => {
                    let _ = log_tx.send(LogEvent::Record { plugin: name.clone(), record });
                }
                Ok(WorkerFrame::Fatal { plugin, error }) => {
                    error!(plugin = %plugin, "worker reported a fatal error: {error}");
                }
                // One bad line must not stop the ones after it.
                Err(e) => {
                    warn!(plugin = %name, error = %e, "discarding malformed frame from worker");
                }
            }
        }
    });

    (
        EventSender { plugin: plugin.to_string(), tx: ev_tx },
        msg_rx,
    )
}
