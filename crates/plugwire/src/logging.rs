use std::fmt;
use std::sync::mpsc::Sender;

use chrono::Utc;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::wire::{LogLevel, LogRecord, WorkerFrame};

/// A `tracing` layer that flattens every event into a [`LogRecord`] and
/// pushes it onto the worker's outbound channel.
///
/// Installed by the runtime with no level filter: inside a worker, deciding
/// which records matter is the host's job, so everything passes through.
pub struct WireLayer {
    out: Sender<WorkerFrame>,
}

impl WireLayer {
    pub fn new(out: Sender<WorkerFrame>) -> Self {
        Self { out }
    }
}

impl<S: Subscriber> Layer<S> for WireLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let record = LogRecord {
            level: LogLevel::from(event.metadata().level()),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            error: visitor.error,
            timestamp: Utc::now(),
        };
        // Receiver gone means the worker is already tearing down.
        let _ = self.out.send(WorkerFrame::Log { record });
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    error: Option<String>,
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "error" => self.error = Some(format!("{value:?}")),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "error" => self.error = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" {
            self.error = Some(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tracing_subscriber::Registry;
    use tracing_subscriber::prelude::*;

    #[test]
    fn every_level_passes_through() {
        let (tx, rx) = mpsc::channel();
        let subscriber = Registry::default().with(WireLayer::new(tx));
        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!(target: "deep", "noise");
            tracing::warn!(target: "noisy", "hello");
        });

        let WorkerFrame::Log { record: first } = rx.recv().unwrap() else {
            panic!("expected a log frame");
        };
        assert_eq!(first.level, LogLevel::Trace);
        assert_eq!(first.target, "deep");
        assert_eq!(first.message, "noise");

        let WorkerFrame::Log { record: second } = rx.recv().unwrap() else {
            panic!("expected a log frame");
        };
        assert_eq!(second.level, LogLevel::Warn);
        assert_eq!(second.target, "noisy");
        assert_eq!(second.message, "hello");
    }

    #[test]
    fn error_fields_are_captured() {
        let (tx, rx) = mpsc::channel();
        let subscriber = Registry::default().with(WireLayer::new(tx));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(error = "boom", "plugin failed");
        });

        let WorkerFrame::Log { record } = rx.recv().unwrap() else {
            panic!("expected a log frame");
        };
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.message, "plugin failed");
        assert_eq!(record.error.as_deref(), Some("boom"));
    }
}
