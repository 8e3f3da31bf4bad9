//! Worker-side SDK for plughost plugins: the wire protocol spoken over
//! stdin/stdout, the [`PluginInterface`] a plugin runs against, and the
//! runtime that turns a binary into a plugin worker.

pub mod error;
pub mod interface;
pub mod logging;
pub mod registry;
pub mod runtime;
pub mod wire;

pub use error::{ChannelError, RecvError, RegistryError, WorkerError};
pub use interface::{PluginInterface, WorkerEvent};
pub use registry::{Plugin, PluginRegistry};
