use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use plugwire::wire::PLUGIN_ENV;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::forwarder::{LogEvent, LogForwarder, LogSink, TracingSink};
use crate::launcher::{LaunchError, Launcher};
use crate::process::{EventSender, WorkerProcess, spawn_io};

/// A subscriber for application messages drained from the workers.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, plugin: &str, message: Value);
}

/// The pluggable clean-shutdown step of the stop escalation. The default
/// pushes the shutdown sentinel onto the plugin's event channel.
#[async_trait]
pub trait ShutdownStrategy: Send + Sync {
    async fn request_shutdown(&self, plugin: &str, events: &EventSender)
    -> Result<(), ManagerError>;
}

pub struct SentinelShutdown;

#[async_trait]
impl ShutdownStrategy for SentinelShutdown {
    async fn request_shutdown(
        &self,
        _plugin: &str,
        events: &EventSender,
    ) -> Result<(), ManagerError> {
        events.send_shutdown()
    }
}

/// How a `stop` call resolved. Exactly one of the first three is reported
/// for a running plugin; `NotRunning` is the soft outcome for an absent name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker observed the shutdown sentinel and exited within the grace
    /// period.
    Clean,
    /// The worker ignored the sentinel but died from the termination signal.
    Killed,
    /// The worker survived both tiers; the registry entry was dropped anyway.
    Abandoned,
    /// There was nothing to stop.
    NotRunning,
}

/// One running plugin instance. Created by `start`, mutated only by the
/// manager, removed by `stop` or the reaper.
struct PluginRecord {
    name: String,
    events: EventSender,
    messages: mpsc::UnboundedReceiver<Value>,
    process: Box<dyn WorkerProcess>,
}

/// Process-wide registry of running plugin workers and the operations on it.
///
/// Every registry-touching operation (`start`, `stop`, `reap`,
/// `process_messages`, `send_event`) serialises on one mutex, so the
/// background reaper can never observe the registry mid-mutation. `stop`
/// holds that lock across its bounded grace waits; callers block for at most
/// two grace periods, never indefinitely.
pub struct PluginManager {
    launcher: Box<dyn Launcher>,
    handler: Arc<dyn MessageHandler>,
    shutdown_strategy: Box<dyn ShutdownStrategy>,
    registry: Mutex<HashMap<String, PluginRecord>>,
    log_tx: mpsc::UnboundedSender<LogEvent>,
    forwarder: StdMutex<Option<LogForwarder>>,
    config: ManagerConfig,
}

impl PluginManager {
    pub fn new(
        launcher: Box<dyn Launcher>,
        handler: Arc<dyn MessageHandler>,
        config: ManagerConfig,
    ) -> Arc<Self> {
        Self::with_parts(launcher, handler, config, Box::new(SentinelShutdown), Arc::new(TracingSink))
    }

    /// Like [`PluginManager::new`] but with a custom log sink, so hosts (and
    /// tests) can capture forwarded worker records.
    pub fn with_sink(
        launcher: Box<dyn Launcher>,
        handler: Arc<dyn MessageHandler>,
        config: ManagerConfig,
        sink: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Self::with_parts(launcher, handler, config, Box::new(SentinelShutdown), sink)
    }

    pub fn with_parts(
        launcher: Box<dyn Launcher>,
        handler: Arc<dyn MessageHandler>,
        config: ManagerConfig,
        shutdown_strategy: Box<dyn ShutdownStrategy>,
        sink: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        let forwarder = LogForwarder::spawn(sink);
        Arc::new(Self {
            launcher,
            handler,
            shutdown_strategy,
            registry: Mutex::new(HashMap::new()),
            log_tx: forwarder.sender(),
            forwarder: StdMutex::new(Some(forwarder)),
            config,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Launch a new worker process for `name`.
    ///
    /// Dead entries are reaped first, so a plugin that exited on its own can
    /// be started again. Nothing is registered unless the launch succeeds:
    /// resolution and spawn failures surface to the caller with no partial
    /// state left behind.
    pub async fn start(&self, name: &str) -> Result<(), ManagerError> {
        let mut registry = self.registry.lock().await;
        Self::reap_locked(&mut registry);

        if registry.contains_key(name) {
            return Err(ManagerError::AlreadyRunning(name.to_string()));
        }

        let mut command = self.launcher.command(name).map_err(|e| match e {
            LaunchError::NotFound(plugin) => ManagerError::PluginNotFound(plugin),
            LaunchError::Io(source) => ManagerError::LaunchFailed { plugin: name.to_string(), source },
        })?;

        info!(plugin = name, "starting plugin");
        let mut child = command
            .env(PLUGIN_ENV, name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ManagerError::LaunchFailed { plugin: name.to_string(), source })?;

        let stdin = child.stdin.take().ok_or_else(|| ManagerError::LaunchFailed {
            plugin: name.to_string(),
            source: std::io::Error::other("worker stdin unavailable"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ManagerError::LaunchFailed {
            plugin: name.to_string(),
            source: std::io::Error::other("worker stdout unavailable"),
        })?;

        let (events, messages) = spawn_io(name, stdin, stdout, self.log_tx.clone());
        registry.insert(
            name.to_string(),
            PluginRecord {
                name: name.to_string(),
                events,
                messages,
                process: Box::new(child),
            },
        );
        info!(plugin = name, "started plugin");
        Ok(())
    }

    /// Stop a plugin: cleanly, then forcefully, then give up.
    ///
    /// Each tier is bounded by the configured grace period. Whatever the
    /// worker does, the registry entry is gone when this returns; an
    /// uncooperative process is logged and abandoned rather than waited on
    /// forever.
    pub async fn stop(&self, name: &str) -> StopOutcome {
        let mut registry = self.registry.lock().await;
        Self::reap_locked(&mut registry);

        let Some(mut record) = registry.remove(name) else {
            info!(plugin = name, "plugin isn't running");
            return StopOutcome::NotRunning;
        };

        let grace = self.config.stop_grace;
        info!(plugin = name, grace_secs = grace.as_secs(), "stopping plugin");

        if let Err(e) = self
            .shutdown_strategy
            .request_shutdown(name, &record.events)
            .await
        {
            warn!(plugin = name, error = %e, "could not request clean shutdown");
        }
        if timeout(grace, record.process.wait()).await.is_ok() {
            info!(plugin = name, "plugin stopped cleanly");
            return StopOutcome::Clean;
        }

        info!(plugin = name, "forcefully killing plugin");
        if let Err(e) = record.process.start_kill() {
            warn!(plugin = name, error = %e, "could not signal plugin");
        }
        if timeout(grace, record.process.wait()).await.is_ok() {
            info!(plugin = name, "plugin killed");
            return StopOutcome::Killed;
        }

        error!(plugin = name, "unable to kill plugin, dropping it from the registry");
        StopOutcome::Abandoned
    }

    /// Push an event onto a running plugin's event channel.
    pub async fn send_event(&self, name: &str, payload: Value) -> Result<(), ManagerError> {
        let registry = self.registry.lock().await;
        match registry.get(name) {
            Some(record) => record.events.send(payload),
            None => Err(ManagerError::NotRunning(name.to_string())),
        }
    }

    /// Drain every plugin's queued messages into the handler.
    ///
    /// FIFO per plugin; the order across plugins is unspecified.
    pub async fn process_messages(&self) {
        let mut registry = self.registry.lock().await;
        Self::reap_locked(&mut registry);
        for record in registry.values_mut() {
            while let Ok(message) = record.messages.try_recv() {
                self.handler.on_message(&record.name, message).await;
            }
        }
    }

    /// Drop every registry entry whose process exited without a `stop`.
    pub async fn reap(&self) {
        let mut registry = self.registry.lock().await;
        Self::reap_locked(&mut registry);
    }

    fn reap_locked(registry: &mut HashMap<String, PluginRecord>) {
        registry.retain(|name, record| match record.process.try_wait() {
            Ok(true) => {
                // Not fatal for the manager, but an exit nobody asked for is
                // worth surfacing.
                warn!(plugin = %name, "plugin terminated on its own");
                false
            }
            Ok(false) => true,
            Err(e) => {
                warn!(plugin = %name, error = %e, "could not poll plugin process");
                true
            }
        });
    }

    /// Names of the currently registered plugins.
    pub async fn running(&self) -> Vec<String> {
        self.registry.lock().await.keys().cloned().collect()
    }

    /// Stop every plugin, then stop the log forwarder. Idempotent.
    pub async fn shutdown(&self) {
        for name in self.running().await {
            self.stop(&name).await;
        }
        let forwarder = self.forwarder.lock().unwrap().take();
        if let Some(forwarder) = forwarder {
            forwarder.shutdown().await;
        }
    }

    #[cfg(test)]
    async fn insert_record(&self, record: PluginRecord) {
        self.registry.lock().await.insert(record.name.clone(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// A worker process with a scripted lifetime, standing in for a real
    /// `tokio::process::Child`.
    struct FakeProcess {
        alive: Arc<AtomicBool>,
        dies_on_kill: bool,
    }

    impl FakeProcess {
        fn new(alive: bool, dies_on_kill: bool) -> (Self, Arc<AtomicBool>) {
            let flag = Arc::new(AtomicBool::new(alive));
            (Self { alive: flag.clone(), dies_on_kill }, flag)
        }
    }

    #[async_trait]
    impl WorkerProcess for FakeProcess {
        async fn wait(&mut self) -> std::io::Result<()> {
            while self.alive.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        }

        fn start_kill(&mut self) -> std::io::Result<()> {
            if self.dies_on_kill {
                self.alive.store(false, Ordering::SeqCst);
            }
            Ok(())
        }

        fn try_wait(&mut self) -> std::io::Result<bool> {
            Ok(!self.alive.load(Ordering::SeqCst))
        }
    }

    struct NoLauncher;

    impl Launcher for NoLauncher {
        fn command(&self, plugin: &str) -> Result<tokio::process::Command, LaunchError> {
            Err(LaunchError::NotFound(plugin.to_string()))
        }
    }

    #[derive(Default)]
    struct Collect(StdMutex<Vec<(String, Value)>>);

    #[async_trait]
    impl MessageHandler for Collect {
        async fn on_message(&self, plugin: &str, message: Value) {
            self.0.lock().unwrap().push((plugin.to_string(), message));
        }
    }

    fn manager_with(handler: Arc<Collect>, grace: Duration) -> Arc<PluginManager> {
        PluginManager::new(
            Box::new(NoLauncher),
            handler,
            ManagerConfig { stop_grace: grace, reap_interval: Duration::from_secs(5) },
        )
    }

    fn manager() -> Arc<PluginManager> {
        manager_with(Arc::new(Collect::default()), Duration::from_millis(200))
    }

    async fn insert_fake(
        manager: &PluginManager,
        name: &str,
        alive: bool,
        dies_on_kill: bool,
    ) -> (Arc<AtomicBool>, tokio::sync::mpsc::UnboundedReceiver<plugwire::wire::HostFrame>) {
        let (process, flag) = FakeProcess::new(alive, dies_on_kill);
        let (events, ev_rx) = EventSender::for_test(name);
        let (_msg_tx, messages) = mpsc::unbounded_channel();
        manager
            .insert_record(PluginRecord {
                name: name.to_string(),
                events,
                messages,
                process: Box::new(process),
            })
            .await;
        (flag, ev_rx)
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let manager = manager();
        let (_flag, _ev_rx) = insert_fake(&manager, "echo", true, true).await;

        let err = manager.start("echo").await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyRunning(name) if name == "echo"));
        assert_eq!(manager.running().await, vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn unresolvable_plugin_registers_nothing() {
        let manager = manager();
        let err = manager.start("missing").await.unwrap_err();
        assert!(matches!(err, ManagerError::PluginNotFound(name) if name == "missing"));
        assert!(manager.running().await.is_empty());
    }

    #[tokio::test]
    async fn stop_on_absent_name_is_a_noop() {
        let manager = manager();
        assert_eq!(manager.stop("ghost").await, StopOutcome::NotRunning);
        assert!(manager.running().await.is_empty());
    }

    #[tokio::test]
    async fn reap_removes_dead_entries_and_is_idempotent() {
        let manager = manager();
        let (_alive, _ev1) = insert_fake(&manager, "alive", true, true).await;
        let (_dead, _ev2) = insert_fake(&manager, "dead", false, true).await;

        manager.reap().await;
        assert_eq!(manager.running().await, vec!["alive".to_string()]);
        manager.reap().await;
        assert_eq!(manager.running().await, vec!["alive".to_string()]);
    }

    #[tokio::test]
    async fn stop_reports_clean_when_the_sentinel_is_honoured() {
        let manager = manager();
        let (flag, mut ev_rx) = insert_fake(&manager, "echo", true, true).await;

        // Simulate a cooperative worker: exit as soon as the sentinel lands.
        tokio::spawn(async move {
            while let Some(frame) = ev_rx.recv().await {
                if frame == plugwire::wire::HostFrame::Shutdown {
                    flag.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        assert_eq!(manager.stop("echo").await, StopOutcome::Clean);
        assert!(manager.running().await.is_empty());
    }

    #[tokio::test]
    async fn stop_escalates_to_kill_when_the_sentinel_is_ignored() {
        let manager = manager();
        let (_flag, _ev_rx) = insert_fake(&manager, "stubborn", true, true).await;

        assert_eq!(manager.stop("stubborn").await, StopOutcome::Killed);
        assert!(manager.running().await.is_empty());
    }

    #[tokio::test]
    async fn stop_abandons_a_worker_that_survives_the_kill() {
        let manager = manager();
        let (_flag, _ev_rx) = insert_fake(&manager, "immortal", true, false).await;

        assert_eq!(manager.stop("immortal").await, StopOutcome::Abandoned);
        // The contract is "the entry is gone", not "the process is gone".
        assert!(manager.running().await.is_empty());
    }

    #[tokio::test]
    async fn process_messages_drains_fifo_per_plugin() {
        let handler = Arc::new(Collect::default());
        let manager = manager_with(handler.clone(), Duration::from_millis(200));

        let (process, _flag) = FakeProcess::new(true, true);
        let (events, _ev_rx) = EventSender::for_test("echo");
        let (msg_tx, messages) = mpsc::unbounded_channel();
        manager
            .insert_record(PluginRecord {
                name: "echo".to_string(),
                events,
                messages,
                process: Box::new(process),
            })
            .await;

        msg_tx.send(json!(1)).unwrap();
        msg_tx.send(json!(2)).unwrap();
        msg_tx.send(json!(3)).unwrap();

        manager.process_messages().await;
        {
            let seen = handler.0.lock().unwrap();
            assert_eq!(
                *seen,
                vec![
                    ("echo".to_string(), json!(1)),
                    ("echo".to_string(), json!(2)),
                    ("echo".to_string(), json!(3)),
                ]
            );
        }

        // A second drain with nothing new queued delivers nothing.
        manager.process_messages().await;
        assert_eq!(handler.0.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn send_event_to_absent_plugin_fails() {
        let manager = manager();
        let err = manager.send_event("ghost", json!("ping")).await.unwrap_err();
        assert!(matches!(err, ManagerError::NotRunning(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let manager = manager();
        let (_a, _ev1) = insert_fake(&manager, "a", true, true).await;
        let (_b, _ev2) = insert_fake(&manager, "b", true, true).await;

        manager.shutdown().await;
        assert!(manager.running().await.is_empty());
    }
}
