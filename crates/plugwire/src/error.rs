use thiserror::Error;

/// The outbound (or blocking inbound) channel endpoint is gone. Inside a
/// worker this means the host closed the pipe or the pump thread died.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel to the host process is closed")]
    Closed,
}

/// Failure modes of the non-blocking and timed receive calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecvError {
    #[error("no event queued")]
    WouldBlock,
    #[error("timed out waiting for an event")]
    Timeout,
    #[error("event channel is closed")]
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a plugin named `{0}` is already registered")]
    Duplicate(String),
}

/// What the worker entry point can report back to the process that spawned
/// it. Plugin run-loop failures are *not* here: those are contained, logged
/// and turned into a normal exit.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no plugin registered under `{0}`")]
    PluginNotFound(String),
    #[error("`{0}` is not set; this binary must be spawned by a plugin host")]
    NameUnset(&'static str),
}
