use thiserror::Error;

/// Failures surfaced synchronously by [`crate::manager::PluginManager`].
///
/// Failures inside a running worker are deliberately absent: they are
/// contained to the worker, reported through the logging path, and end in a
/// normal process exit that the reaper cleans up.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("plugin `{0}` is already running")]
    AlreadyRunning(String),
    #[error("no plugin found for `{0}`")]
    PluginNotFound(String),
    #[error("could not launch plugin `{plugin}`")]
    LaunchFailed {
        plugin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("plugin `{0}` is not running")]
    NotRunning(String),
    #[error("event channel for plugin `{0}` is closed")]
    ChannelClosed(String),
}
