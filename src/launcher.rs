use std::path::PathBuf;

use thiserror::Error;
use tokio::process::Command;

/// Resolution failures at the launch boundary.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no plugin executable for `{0}`")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves a plugin name to a launchable command.
///
/// This is the manager's only knowledge of where plugin code lives. The
/// manager itself wires stdio and the plugin-name environment variable onto
/// whatever command the launcher hands back.
pub trait Launcher: Send + Sync {
    fn command(&self, plugin: &str) -> Result<Command, LaunchError>;
}

/// The reference resolution policy: an executable named `<name>_plugin` in a
/// fixed directory. A policy, not a requirement — hosts with other layouts
/// implement [`Launcher`] themselves.
pub struct ExeDirLauncher {
    dir: PathBuf,
}

impl ExeDirLauncher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Launcher for ExeDirLauncher {
    fn command(&self, plugin: &str) -> Result<Command, LaunchError> {
        let exe = self
            .dir
            .join(format!("{plugin}_plugin{}", std::env::consts::EXE_SUFFIX));
        if !exe.is_file() {
            return Err(LaunchError::NotFound(plugin.to_string()));
        }
        Ok(Command::new(exe))
    }
}
