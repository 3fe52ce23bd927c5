use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "gpro.log";

/// Initialize tracing with a compact stdout layer and a daily rolling file.
///
/// - Default level: `info,gpro=debug`, override via `RUST_LOG`
/// - The returned guard flushes the file writer on drop and must be held
///   for the lifetime of the process
pub fn init(log_dir: &Path) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gpro=debug"));

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .compact();

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), "Tracing initialized");
    guard
}

/// Test layer recording the `message` of every event it sees.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CapturedMessages(std::sync::Arc<parking_lot::Mutex<Vec<String>>>);

#[cfg(test)]
impl CapturedMessages {
    /// Subscriber feeding this capture; install with `with_default`/`set_default`.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::registry().with(self.clone())
    }

    pub fn count(&self, message: &str) -> usize {
        self.0.lock().iter().filter(|m| m.as_str() == message).count()
    }
}

#[cfg(test)]
impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CapturedMessages {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        struct MessageVisitor<'a>(&'a mut String);

        impl tracing::field::Visit for MessageVisitor<'_> {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    *self.0 = value.to_string();
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    *self.0 = format!("{:?}", value);
                }
            }
        }

        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        self.0.lock().push(message);
    }
}
