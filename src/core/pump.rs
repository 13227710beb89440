//! # Stdout pump: child output → framer → router / command bridge / passthrough.
//!
//! ```text
//! ChildStdout ──read──► utf-8 reassembly ──► Framer::push(chunk)
//!                                              ├─ Message ──► route()
//!                                              │                ├─ Pid   → registry.record_pid + PidReported
//!                                              │                ├─ Stats → BroadcastStats(payload)
//!                                              │                └─ other → ignored
//!                                              ├─ Malformed ─► MessageDropped
//!                                              ├─ Pending   ─► (wait for more)
//!                                              └─ Text ─────► CommandBridge::offer
//!                                                               └─ not handled → Passthrough::write
//! ```
//!
//! One pump runs per process instance and owns that instance's [`Framer`], so
//! chunks of one child are handled strictly in arrival order and never mix
//! with the other child's partial frames.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::command::CommandBridge;
use crate::core::output::Passthrough;
use crate::core::registry::ProcessRegistry;
use crate::events::{Bus, Event, EventKind};
use crate::protocol::{Frame, Framer, Route, route};
use crate::role::Role;

/// Read buffer size; the OS decides the actual chunk boundaries.
const READ_CHUNK: usize = 8 * 1024;

pub(crate) struct Pump {
    role: Role,
    generation: u64,
    framer: Framer,
    registry: Arc<ProcessRegistry>,
    bus: Bus,
    bridge: CommandBridge,
    sink: Arc<dyn Passthrough>,
}

impl Pump {
    pub(crate) fn new(
        role: Role,
        generation: u64,
        registry: Arc<ProcessRegistry>,
        bus: Bus,
        bridge: CommandBridge,
        sink: Arc<dyn Passthrough>,
    ) -> Self {
        Self {
            role,
            generation,
            framer: Framer::new(),
            registry,
            bus,
            bridge,
            sink,
        }
    }

    /// Reads `reader` to EOF, handling every chunk.
    pub(crate) async fn run<R>(&mut self, mut reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut carry = Vec::new();
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(role = %self.role, error = %e, "stdout read failed");
                    break;
                }
            };
            carry.extend_from_slice(&buf[..n]);
            let text = take_utf8(&mut carry);
            if !text.is_empty() {
                self.feed(&text).await;
            }
        }
        if !carry.is_empty() {
            let text = String::from_utf8_lossy(&carry).into_owned();
            self.feed(&text).await;
        }
    }

    /// Handles one chunk of child output.
    pub(crate) async fn feed(&mut self, chunk: &str) {
        match self.framer.push(chunk) {
            Frame::Pending => {}
            Frame::Message(message) => self.dispatch(message),
            Frame::Malformed(reason) => {
                tracing::debug!(role = %self.role, %reason, "dropping malformed message");
                self.bus.publish(
                    Event::new(EventKind::MessageDropped)
                        .with_role(self.role)
                        .with_reason(reason),
                );
            }
            Frame::Text(text) => {
                if !self.bridge.offer(&text).await {
                    self.sink.write(&text);
                }
            }
        }
    }

    fn dispatch(&self, message: serde_json::Value) {
        match route(message) {
            Route::Pid(pid) => {
                if self.registry.record_pid(self.role, self.generation, pid) {
                    tracing::debug!(role = %self.role, pid, "child reported pid");
                    self.bus.publish(
                        Event::new(EventKind::PidReported)
                            .with_role(self.role)
                            .with_generation(self.generation)
                            .with_pid(pid),
                    );
                }
            }
            Route::Stats(payload) => {
                self.bus.publish(
                    Event::new(EventKind::BroadcastStats)
                        .with_role(self.role)
                        .with_payload(payload),
                );
            }
            Route::Ignored => {
                tracing::trace!(role = %self.role, "ignoring message without known type");
            }
        }
    }
}

/// Decodes as much of `carry` as is complete UTF-8.
///
/// An incomplete multi-byte sequence at the end stays in `carry` for the next
/// read; each invalid sequence before it becomes U+FFFD.
fn take_utf8(carry: &mut Vec<u8>) -> String {
    let mut out = String::with_capacity(carry.len());
    let mut rest = carry.as_slice();
    loop {
        match std::str::from_utf8(rest) {
            Ok(text) => {
                out.push_str(text);
                rest = &[];
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[bad..];
                    }
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }
    let tail = rest.to_vec();
    *carry = tail;
    out
}
