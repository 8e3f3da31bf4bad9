//! Worker entry point: the code that runs inside a spawned plugin process.
//!
//! `run_from_env` wires stdin/stdout to a [`PluginInterface`], routes every
//! `tracing` record onto the wire, resolves the plugin through the
//! [`PluginRegistry`] and runs it. A failing run loop is caught here, logged
//! and reported as a `Fatal` frame; it ends the worker with a normal exit and
//! never escapes the process boundary silently.
//!
//! Usage, from a worker binary's `main`:
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     let mut registry = PluginRegistry::new();
//!     registry.register("echo", || EchoPlugin)?;
//!     plugwire::runtime::run_from_env(&registry)?;
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use tracing::{error, info};
use tracing_subscriber::Registry;
use tracing_subscriber::prelude::*;

use crate::error::WorkerError;
use crate::interface::{PluginInterface, WorkerEvent};
use crate::logging::WireLayer;
use crate::registry::PluginRegistry;
use crate::wire::{self, HostFrame, PLUGIN_ENV, WorkerFrame};

/// Run the plugin named by the `PLUGHOST_PLUGIN` environment variable, which
/// the host sets on every worker it spawns.
pub fn run_from_env(registry: &PluginRegistry) -> Result<(), WorkerError> {
    let name = std::env::var(PLUGIN_ENV).map_err(|_| WorkerError::NameUnset(PLUGIN_ENV))?;
    run_plugin(registry, &name)
}

/// Run one named plugin against this process's stdin/stdout.
///
/// Returns `Err` only for failures the worker itself is responsible for
/// (unresolvable plugin name). A plugin whose run loop errors or panics is
/// contained: the failure is logged, reported to the host, and `Ok(())` is
/// returned so the process exits normally.
pub fn run_plugin(registry: &PluginRegistry, name: &str) -> Result<(), WorkerError> {
    let (out_tx, out_rx) = channel::<WorkerFrame>();
    let writer = thread::spawn(move || write_frames(out_rx));

    let (ev_tx, ev_rx) = channel::<WorkerEvent>();
    thread::spawn(move || read_events(ev_tx));

    // Every record goes to the wire unfiltered; which records matter is
    // decided host-side. The guard scopes the subscriber to this run; it
    // holds a clone of the frame sender, so it must be dropped before the
    // writer is joined or the channel never disconnects.
    let subscriber = Registry::default().with(WireLayer::new(out_tx.clone()));
    let guard = tracing::subscriber::set_default(subscriber);

    let Some(mut plugin) = registry.resolve(name) else {
        let err = WorkerError::PluginNotFound(name.to_string());
        error!(plugin = name, "{err}");
        let _ = out_tx.send(WorkerFrame::Fatal {
            plugin: name.to_string(),
            error: err.to_string(),
        });
        drop(guard);
        finish(out_tx, writer);
        return Err(err);
    };

    let interface = PluginInterface::from_parts(ev_rx, out_tx.clone());
    info!(plugin = name, "plugin running");

    match panic::catch_unwind(AssertUnwindSafe(|| plugin.run(&interface))) {
        Ok(Ok(())) => info!(plugin = name, "plugin finished"),
        Ok(Err(e)) => {
            error!(plugin = name, error = %e, "plugin run loop failed");
            let _ = out_tx.send(WorkerFrame::Fatal {
                plugin: name.to_string(),
                error: e.to_string(),
            });
        }
        Err(payload) => {
            let message = panic_message(payload);
            error!(plugin = name, error = %message, "plugin panicked");
            let _ = out_tx.send(WorkerFrame::Fatal {
                plugin: name.to_string(),
                error: message,
            });
        }
    }

    drop(interface);
    drop(guard);
    finish(out_tx, writer);
    Ok(())
}

/// Drop the last frame sender and wait for the writer to drain its queue, so
/// nothing the plugin said is lost in the process exit.
fn finish(out_tx: Sender<WorkerFrame>, writer: thread::JoinHandle<()>) {
    drop(out_tx);
    let _ = writer.join();
}

fn write_frames(rx: Receiver<WorkerFrame>) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    while let Ok(frame) = rx.recv() {
        let line = match wire::to_line(&frame) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("plugwire: could not serialise frame: {e}");
                continue;
            }
        };
        if out.write_all(line.as_bytes()).is_err() {
            break;
        }
        if out.flush().is_err() {
            break;
        }
    }
}

fn read_events(tx: Sender<WorkerEvent>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let event = match wire::parse_line::<HostFrame>(&line) {
            Ok(HostFrame::Event { payload }) => WorkerEvent::Event(payload),
            Ok(HostFrame::Shutdown) => WorkerEvent::Shutdown,
            Err(e) => {
                eprintln!("plugwire: discarding malformed event frame: {e}");
                continue;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin panicked".to_string()
    }
}
