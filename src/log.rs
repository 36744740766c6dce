//! Accumulating diagnostic text log.
//!
//! The log is an ordered, append-only buffer of human-readable lines.
//! It only shrinks when a caller drains it with [`DiagnosticLog::take`].
//! Components receive a `DiagnosticLog` explicitly; the boundary layer
//! shares the process-wide instance returned by [`DiagnosticLog::global`].

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Shared handle to a diagnostic text buffer. Clones append to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    text: Arc<Mutex<String>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide log used by the boundary functions.
    pub fn global() -> &'static DiagnosticLog {
        static GLOBAL: OnceLock<DiagnosticLog> = OnceLock::new();
        GLOBAL.get_or_init(DiagnosticLog::new)
    }

    /// Append one line. Every line is also emitted as a tracing event.
    pub fn append(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        tracing::warn!(target: "appx_unpack::diagnostics", "{}", line);
        let mut text = self.buffer();
        text.push_str(line);
        text.push('\n');
    }

    /// Copy of the accumulated text.
    pub fn text(&self) -> String {
        self.buffer().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    /// Return the accumulated text and clear the log in one step.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer())
    }

    /// Hand the accumulated text to `f` and clear the log only if `f`
    /// succeeds. Nothing can be appended in between.
    pub fn take_with<T, E>(&self, f: impl FnOnce(&str) -> Result<T, E>) -> Result<T, E> {
        let mut text = self.buffer();
        let out = f(&text)?;
        text.clear();
        Ok(out)
    }

    fn buffer(&self) -> MutexGuard<'_, String> {
        self.text.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
