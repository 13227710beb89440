//! Error types used by the mailvisor runtime.
//!
//! - [`RuntimeError`] errors raised by the supervisor run loop.
//! - [`ConfigError`] errors raised while loading or validating configuration.
//! - [`CommandError`] errors raised by an external command executor.
//!
//! Each type provides `as_label` for logs. None of these is raised for the
//! ordinary failure modes of the children (exits, malformed frames, starts
//! while halted); those are events or silent no-ops.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::role::Role;

/// # Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Children did not exit within the grace period after halt and were killed.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Roles still alive when the grace period ran out.
        stuck: Vec<Role>,
    },

    /// Installing OS signal handlers failed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    /// Delivering a signal to a child failed.
    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: i32,
        signal: &'static str,
        #[source]
        source: io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use mailvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signals(_) => "runtime_signals",
            RuntimeError::Signal { .. } => "runtime_signal_failed",
        }
    }
}

/// # Errors produced while loading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config for {role}: {reason}")]
    Invalid { role: &'static str, reason: String },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors produced by an external command executor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command was recognized but failed while running.
    #[error("command `{command}` failed: {reason}")]
    Failed { command: String, reason: String },
}

impl CommandError {
    pub fn as_label(&self) -> &'static str {
        match self {
            CommandError::Failed { .. } => "command_failed",
        }
    }
}
