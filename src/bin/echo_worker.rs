//! Demo worker binary hosting the example plugins used by the integration
//! tests. A real deployment would ship one such binary per plugin (or per
//! plugin bundle); the host tells it which plugin to run via the environment.

use std::time::Duration;

use anyhow::bail;
use plugwire::{Plugin, PluginInterface, PluginRegistry, WorkerEvent, runtime};
use serde_json::json;

/// Replies `"ack"` to every event and exits on the shutdown sentinel.
struct Echo;

impl Plugin for Echo {
    fn run(&mut self, interface: &PluginInterface) -> anyhow::Result<()> {
        loop {
            match interface.recv()? {
                WorkerEvent::Shutdown => return Ok(()),
                WorkerEvent::Event(_) => interface.send(json!("ack"))?,
            }
        }
    }
}

/// Never looks at its event channel; only a termination signal removes it.
struct Stubborn;

impl Plugin for Stubborn {
    fn run(&mut self, _interface: &PluginInterface) -> anyhow::Result<()> {
        loop {
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}

/// Finishes its own work immediately; the reaper cleans up after it.
struct Quitter;

impl Plugin for Quitter {
    fn run(&mut self, _interface: &PluginInterface) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Emits one warning, then waits to be told to stop.
struct Noisy;

impl Plugin for Noisy {
    fn run(&mut self, interface: &PluginInterface) -> anyhow::Result<()> {
        tracing::warn!(target: "noisy", "hello");
        loop {
            if interface.recv()? == WorkerEvent::Shutdown {
                return Ok(());
            }
        }
    }
}

/// A second talker, distinguishable from `Noisy` by target and message.
struct Chatty;

impl Plugin for Chatty {
    fn run(&mut self, interface: &PluginInterface) -> anyhow::Result<()> {
        tracing::warn!(target: "chatty", "hola");
        loop {
            if interface.recv()? == WorkerEvent::Shutdown {
                return Ok(());
            }
        }
    }
}

/// Fails its run loop straight away.
struct Failing;

impl Plugin for Failing {
    fn run(&mut self, _interface: &PluginInterface) -> anyhow::Result<()> {
        bail!("this plugin always fails")
    }
}

fn build_registry() -> anyhow::Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register("echo", || Echo)?;
    registry.register("stubborn", || Stubborn)?;
    registry.register("quitter", || Quitter)?;
    registry.register("noisy", || Noisy)?;
    registry.register("chatty", || Chatty)?;
    registry.register("failing", || Failing)?;
    Ok(registry)
}

fn main() -> anyhow::Result<()> {
    let registry = build_registry()?;
    runtime::run_from_env(&registry)?;
    Ok(())
}
