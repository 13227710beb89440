//! # Out-of-band control signals to children.
//!
//! Children are signalled by the pid they reported over the message protocol:
//!
//! | [`ControlSignal`]              | unix signal | sent when                       |
//! |--------------------------------|-------------|---------------------------------|
//! | [`ControlSignal::RequestStats`]| `SIGUSR2`   | stats timer fires (sync only)   |
//! | [`ControlSignal::Quit`]        | `SIGQUIT`   | `Supervisor::halt`              |
//!
//! Delivery goes through the [`SignalSender`] seam so the supervisor can be
//! driven without real processes; [`OsSignals`] is the production sender.

use std::io;

use crate::error::RuntimeError;

/// Signal the supervisor sends to a child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    /// Ask the sync engine to print a stats snapshot.
    RequestStats,
    /// Ask a child to shut down gracefully.
    Quit,
}

impl ControlSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSignal::RequestStats => "SIGUSR2",
            ControlSignal::Quit => "SIGQUIT",
        }
    }

    #[cfg(unix)]
    fn raw(&self) -> libc::c_int {
        match self {
            ControlSignal::RequestStats => libc::SIGUSR2,
            ControlSignal::Quit => libc::SIGQUIT,
        }
    }
}

/// Delivers control signals to a pid.
pub trait SignalSender: Send + Sync + 'static {
    fn send(&self, pid: i32, signal: ControlSignal) -> Result<(), RuntimeError>;
}

/// Sends real signals with `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

impl SignalSender for OsSignals {
    fn send(&self, pid: i32, signal: ControlSignal) -> Result<(), RuntimeError> {
        let fail = |source| RuntimeError::Signal {
            pid,
            signal: signal.as_str(),
            source,
        };

        // 0 and negative pids address process groups.
        if pid <= 0 {
            return Err(fail(io::Error::new(
                io::ErrorKind::InvalidInput,
                "pid must be positive",
            )));
        }

        #[cfg(unix)]
        {
            // SAFETY: kill(2) has no memory-safety preconditions.
            let rc = unsafe { libc::kill(pid, signal.raw()) };
            if rc == -1 {
                return Err(fail(io::Error::last_os_error()));
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            Err(fail(io::Error::new(
                io::ErrorKind::Unsupported,
                "signals are only supported on unix",
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_group_pids() {
        let err = OsSignals.send(0, ControlSignal::Quit).unwrap_err();
        assert_eq!(err.as_label(), "runtime_signal_failed");
        assert!(OsSignals.send(-1, ControlSignal::RequestStats).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_process_reports_errno() {
        // pid_max on linux is at most 2^22.
        let err = OsSignals.send(i32::MAX, ControlSignal::Quit).unwrap_err();
        match err {
            RuntimeError::Signal { pid, signal, source } => {
                assert_eq!(pid, i32::MAX);
                assert_eq!(signal, "SIGQUIT");
                assert_eq!(source.raw_os_error(), Some(libc::ESRCH));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
