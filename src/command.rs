//! # Command bridge for plain-text child output.
//!
//! Children may print a single-line command instead of log text. Before the
//! supervisor echoes a line to its own stdout it offers the line to a
//! [`Command`] capability:
//!
//! ```text
//! Frame::Text(line) ──► CommandBridge::offer(line)
//!                          ├─ is_valid(line) → run(line) → handled (no echo)
//!                          └─ otherwise                  → not handled (echo)
//! ```
//!
//! Validation and execution live outside this crate; [`NoCommands`] is the
//! default capability and recognizes nothing.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommandError;

/// External command validator/executor.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Returns true if `line` is a command this executor understands.
    fn is_valid(&self, line: &str) -> bool;

    /// Executes a line previously accepted by [`Command::is_valid`].
    async fn run(&self, line: &str) -> Result<(), CommandError>;
}

/// Capability that recognizes no commands; every line is passthrough.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCommands;

#[async_trait]
impl Command for NoCommands {
    fn is_valid(&self, _line: &str) -> bool {
        false
    }

    async fn run(&self, _line: &str) -> Result<(), CommandError> {
        Ok(())
    }
}

/// Offers plain-text lines to a [`Command`] capability.
#[derive(Clone)]
pub struct CommandBridge {
    command: Arc<dyn Command>,
}

impl CommandBridge {
    pub fn new(command: Arc<dyn Command>) -> Self {
        Self { command }
    }

    /// Runs `line` if it is a recognized command.
    ///
    /// Returns `true` when the line was handled and must not be echoed. A
    /// command that fails while running is still handled.
    pub async fn offer(&self, line: &str) -> bool {
        if !self.command.is_valid(line) {
            return false;
        }
        if let Err(e) = self.command.run(line).await {
            tracing::warn!(error = %e, label = e.as_label(), "child command failed");
        }
        true
    }
}

impl Default for CommandBridge {
    fn default() -> Self {
        Self::new(Arc::new(NoCommands))
    }
}
