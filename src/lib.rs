//! plughost — run plugins as supervised child processes.
//!
//! Each plugin lives in its own OS process with a pair of ordered channels
//! back to the host (events out, messages in) plus a shared log channel, so
//! a misbehaving plugin can hang or crash without taking the host with it.
//! The [`manager::PluginManager`] owns the registry of running workers and
//! the start / stop / reap lifecycle; [`reaper::spawn_reaper`] sweeps up
//! workers that exited on their own; [`forwarder::LogForwarder`] re-emits
//! worker log records through the host's own `tracing` sink.
//!
//! The worker side of the protocol lives in the `plugwire` crate.

pub mod config;
pub mod error;
pub mod forwarder;
pub mod launcher;
pub mod logging;
pub mod manager;
pub mod process;
pub mod reaper;

pub use config::ManagerConfig;
pub use error::ManagerError;
pub use forwarder::{LogForwarder, LogSink, TracingSink};
pub use launcher::{ExeDirLauncher, LaunchError, Launcher};
pub use manager::{MessageHandler, PluginManager, SentinelShutdown, ShutdownStrategy, StopOutcome};
pub use reaper::{ReaperHandle, spawn_reaper};
