//! # Supervised process roles.
//!
//! The supervisor manages exactly two kinds of children:
//! - [`Role::Sync`] the mail synchronization engine;
//! - [`Role::Server`] the web front end.
//!
//! Roles key every per-process table in the crate (slots, framing buffers,
//! decay state), so they are `Copy` and cheap to hash.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of supervised child process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Mail synchronization engine.
    Sync,
    /// Web serving process.
    Server,
}

impl Role {
    /// Both roles, in start order.
    pub const ALL: [Role; 2] = [Role::Sync, Role::Server];

    /// Stable lowercase name used in logs and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sync => "sync",
            Role::Server => "server",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-size table indexed by [`Role`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerRole<T> {
    pub sync: T,
    pub server: T,
}

impl<T> PerRole<T> {
    pub fn new(sync: T, server: T) -> Self {
        Self { sync, server }
    }

    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Sync => &self.sync,
            Role::Server => &self.server,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Sync => &mut self.sync,
            Role::Server => &mut self.server,
        }
    }
}
