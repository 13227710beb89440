//! Passthrough of child log text to the supervisor's own stdout.

use std::io::Write;

/// Destination for child output that is neither a message nor a command.
pub trait Passthrough: Send + Sync + 'static {
    /// Writes `text` verbatim.
    fn write(&self, text: &str);
}

/// Writes to the process stdout and flushes after every chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl Passthrough for Stdout {
    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "passthrough write failed");
        }
    }
}
