//! Serialized event loop around the orchestrator
//! Adapter callbacks, timer expiries and application commands all arrive on one
//! queue and are handled one at a time, so the orchestrator never sees
//! concurrent calls.

use anyhow::{anyhow, Result};
use log::info;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::events::{
    event_channel, EventReceiver, EventSender, MonitorCommand, MonitorEvent,
};
use crate::core::bluetooth::orchestrator::Orchestrator;
use crate::core::bluetooth::sink::EventSink;
use crate::core::bluetooth::timer::Timeouts;
use crate::core::bluetooth::types::ConnectionState;

/// Sends commands to a running [`HeartRateMonitor`]
#[derive(Clone)]
pub struct MonitorHandle {
    events: EventSender,
}

impl MonitorHandle {
    pub fn start_scan(&self) -> Result<()> {
        self.send(MonitorCommand::StartScan)
    }

    pub fn stop_scan(&self) -> Result<()> {
        self.send(MonitorCommand::StopScan)
    }

    /// Asks the monitor to release the peripheral and leave its loop
    pub fn shutdown(&self) -> Result<()> {
        self.send(MonitorCommand::Shutdown)
    }

    fn send(&self, command: MonitorCommand) -> Result<()> {
        self.events
            .send(command.into())
            .map_err(|_| anyhow!("Heart rate monitor is no longer running"))
    }
}

pub struct HeartRateMonitor<A: BleAdapter, S: EventSink> {
    orchestrator: Orchestrator<A, S>,
    events: EventReceiver,
}

impl<A: BleAdapter, S: EventSink> HeartRateMonitor<A, S> {
    /// Creates a monitor from an already built event queue. The adapter must
    /// post its events to a sender of the same queue.
    pub fn new(adapter: A, sink: S, timeouts: Timeouts, queue: (EventSender, EventReceiver)) -> Self {
        let (sender, events) = queue;
        Self {
            orchestrator: Orchestrator::new(adapter, sink, timeouts, sender),
            events,
        }
    }

    /// Creates the queue, lets `build_adapter` capture a sender, and builds the monitor
    pub fn with_adapter<F>(build_adapter: F, sink: S, timeouts: Timeouts) -> Self
    where
        F: FnOnce(EventSender) -> A,
    {
        let (sender, events) = event_channel();
        let adapter = build_adapter(sender.clone());
        Self::new(adapter, sink, timeouts, (sender, events))
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            events: self.orchestrator.event_sender(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        self.orchestrator.state()
    }

    pub fn orchestrator(&self) -> &Orchestrator<A, S> {
        &self.orchestrator
    }

    /// Processes events until a shutdown command arrives.
    /// Returns the orchestrator so callers can inspect its final state.
    pub async fn run(mut self) -> Orchestrator<A, S> {
        info!("Heart rate monitor started");
        while let Some(event) = self.events.recv().await {
            let shutdown = event == MonitorEvent::Command(MonitorCommand::Shutdown);
            self.orchestrator.handle(event);
            if shutdown {
                break;
            }
        }
        info!("Heart rate monitor stopped");
        self.orchestrator
    }
}
