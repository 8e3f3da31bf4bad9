use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// Wire types exchanged between the host process and a plugin worker.
///
/// Each worker owns exactly two ordered byte streams: the host writes
/// `HostFrame`s to the worker's stdin (the event channel) and the worker
/// writes `WorkerFrame`s to its stdout (the message channel). Frames are one
/// JSON object per line so either side can resynchronise after a bad line.
/// Everything crossing the boundary is plain data; a frame never carries a
/// reference back into the memory of the process that produced it.

/// Environment variable the host sets on every spawned worker so the runtime
/// knows which plugin to resolve.
pub const PLUGIN_ENV: &str = "PLUGHOST_PLUGIN";

/// Host → worker frames, delivered over the worker's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostFrame {
    /// A normal application event for the plugin.
    Event { payload: Value },
    /// The shutdown sentinel. Not an event: it tells the plugin to quiesce
    /// and must be checked for before any payload handling.
    Shutdown,
}

/// Worker → host frames, delivered over the worker's stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerFrame {
    /// An application message for the host's message handler.
    Message { payload: Value },
    /// A log record captured inside the worker, to be re-emitted host-side.
    Log { record: LogRecord },
    /// The worker's last words when its run loop cannot continue, so the
    /// host never has to interpret an ambiguous empty exit.
    Fatal { plugin: String, error: String },
}

/// A flattened logging event. Rendered up front so it survives the worker's
/// death and crosses the process boundary by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    /// The originating logger name (`tracing` target).
    pub target: String,
    pub message: String,
    /// Captured error text, if the event carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// Serialise a frame as a single newline-terminated line.
pub fn to_line<T: Serialize>(frame: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

/// Parse one line back into a frame.
pub fn parse_line<T: DeserializeOwned>(line: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_event_frame() {
        let frame = HostFrame::Event { payload: json!({"text": "hi"}) };
        let line = to_line(&frame).unwrap();
        assert!(line.ends_with('\n'));
        let de: HostFrame = parse_line(&line).unwrap();
        assert_eq!(de, frame);
    }

    #[test]
    fn shutdown_is_distinguishable_from_events() {
        let line = to_line(&HostFrame::Shutdown).unwrap();
        assert!(line.contains("shutdown"));
        let de: HostFrame = parse_line(&line).unwrap();
        assert_eq!(de, HostFrame::Shutdown);
    }

    #[test]
    fn roundtrip_log_record() {
        let frame = WorkerFrame::Log {
            record: LogRecord {
                level: LogLevel::Warn,
                target: "noisy".into(),
                message: "hello".into(),
                error: Some("boom".into()),
                timestamp: Utc::now(),
            },
        };
        let de: WorkerFrame = parse_line(&to_line(&frame).unwrap()).unwrap();
        assert_eq!(de, frame);
    }

    #[test]
    fn log_level_string_forms() {
        let level: LogLevel = "warn".parse().unwrap();
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(level.to_string(), "warn");
        assert_eq!(LogLevel::from(&tracing::Level::ERROR), LogLevel::Error);
    }

    #[test]
    fn malformed_line_is_an_error_not_a_panic() {
        assert!(parse_line::<WorkerFrame>("{not json").is_err());
    }
}
