//! # RestartOnExit: the default restart policy
//!
//! Closes the loop between the supervisor's exit notifications and its
//! restart operations:
//!
//! ```text
//! SyncExited / ServerExited ──► restart_with_decay(role, StartRequested(role))
//!                                        │ (after the decayed interval)
//! StartRequested(role) ◄─────────────────┘
//!        └──► start_sync() / start_web_server()
//!
//! BroadcastStats(payload) ──► forward_stats(payload)   (own task)
//! ```
//!
//! Stats writes never run on this subscriber's worker, so a server that stops
//! reading its stdin cannot delay restarts.
//!
//! Holds a [`Weak`] reference so the subscriber never keeps the supervisor alive.

use std::sync::Weak;

use async_trait::async_trait;

use crate::core::Supervisor;
use crate::events::{Event, EventKind};
use crate::role::Role;
use crate::subscribers::Subscribe;

/// Restarts exited children and forwards stats to the server.
pub struct RestartOnExit {
    supervisor: Weak<Supervisor>,
}

impl RestartOnExit {
    pub fn new(supervisor: Weak<Supervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Subscribe for RestartOnExit {
    async fn on_event(&self, ev: &Event) {
        let Some(sup) = self.supervisor.upgrade() else {
            return;
        };
        match (ev.kind, ev.role) {
            (EventKind::SyncExited | EventKind::ServerExited, Some(role)) => {
                if sup.is_halted() {
                    return;
                }
                sup.restart_with_decay(role, Event::start_requested(role));
            }
            (EventKind::StartRequested, Some(Role::Sync)) => {
                sup.start_sync();
            }
            (EventKind::StartRequested, Some(Role::Server)) => {
                sup.start_web_server();
            }
            (EventKind::BroadcastStats, _) => {
                if let Some(payload) = ev.payload.clone() {
                    sup.forward_stats(payload);
                }
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "RestartOnExit"
    }
}
