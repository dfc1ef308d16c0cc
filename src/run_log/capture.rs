//! Collects the log lines emitted while a run is open so they can be stored
//! with the run.

use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// A `tracing` layer that buffers formatted events between [`LogCapture::begin`]
/// and [`LogCapture::take`]. Outside that window events are ignored.
///
/// Clones share one buffer: install one clone in the subscriber and hand
/// another to the run log.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Option<String>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh buffer, discarding anything not yet taken.
    pub fn begin(&self) {
        *self.buffer.lock().unwrap() = Some(String::new());
    }

    /// Stop capturing and return what was collected since `begin`.
    pub fn take(&self) -> Option<String> {
        self.buffer.lock().unwrap().take()
    }

    pub fn is_capturing(&self) -> bool {
        self.buffer.lock().unwrap().is_some()
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut buffer = self.buffer.lock().unwrap();
        let Some(lines) = buffer.as_mut() else {
            return;
        };

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let _ = writeln!(
            lines,
            "{} {} {}: {}{}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            metadata.level(),
            metadata.target(),
            visitor.message,
            visitor.fields
        );
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
