use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::output::{Passthrough, Stdout};
use super::signal::{OsSignals, SignalSender};
use super::supervisor::{Supervisor, SupervisorParts};
use crate::command::{Command, CommandBridge};
use crate::events::Bus;
use crate::subscribers::{RestartOnExit, Subscribe, SubscriberSet};

/// Builder for constructing a [`Supervisor`] with its collaborators.
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    command: Option<Arc<dyn Command>>,
    sink: Arc<dyn Passthrough>,
    signals: Arc<dyn SignalSender>,
    restart_on_exit: bool,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            command: None,
            sink: Arc::new(Stdout),
            signals: Arc::new(OsSignals),
            restart_on_exit: false,
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the capability that recognizes and runs commands printed by children.
    pub fn with_command(mut self, command: Arc<dyn Command>) -> Self {
        self.command = Some(command);
        self
    }

    /// Sets where plain child output goes (stdout by default).
    pub fn with_passthrough(mut self, sink: Arc<dyn Passthrough>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets how control signals reach children (`kill(2)` by default).
    pub fn with_signals(mut self, signals: Arc<dyn SignalSender>) -> Self {
        self.signals = signals;
        self
    }

    /// Adds the [`RestartOnExit`] policy subscriber.
    pub fn with_restart_on_exit(mut self) -> Self {
        self.restart_on_exit = true;
        self
    }

    /// Builds the supervisor and starts delivering events to subscribers.
    ///
    /// Must be called within a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let runtime_token = CancellationToken::new();
        let bridge = self.command.map(CommandBridge::new).unwrap_or_default();

        let mut subscribers = self.subscribers;
        let restart_on_exit = self.restart_on_exit;
        let cfg = self.cfg;
        let sink = self.sink;
        let signals = self.signals;

        let sup = Arc::new_cyclic(|weak| {
            if restart_on_exit {
                subscribers.push(Arc::new(RestartOnExit::new(weak.clone())));
            }
            let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
            Supervisor::new_internal(SupervisorParts {
                cfg,
                bus,
                subs,
                runtime_token,
                bridge,
                sink,
                signals,
            })
        });
        sup.subscriber_listener();
        sup
    }
}
