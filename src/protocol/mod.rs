//! Child → supervisor stream protocol.
//!
//! - [`framer`]: splits raw stdout chunks into text and JSON frames;
//! - [`message`]: routes decoded frames by their `type` tag.
//!
//! The supervisor's per-process pump (`core::pump`) glues the two together with
//! the [`CommandBridge`](crate::CommandBridge) and the passthrough sink.

pub mod framer;
pub mod message;

pub use framer::{Frame, Framer};
pub use message::{Route, route};
