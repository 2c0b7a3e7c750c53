//! Timers scoped to a single connection state

use std::time::Duration;

use log::trace;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::core::bluetooth::events::{EventSender, MonitorEvent, TimerKind};

/// Timeout durations for the states that have one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub scan: Duration,
    pub connect: Duration,
}

impl Timeouts {
    pub fn duration(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::Scan => self.scan,
            TimerKind::Connect => self.connect,
        }
    }
}

/// A countdown that posts `TimerExpired` to the event queue unless it is
/// dropped first. Dropping the timer cancels it.
pub struct ScopedTimer {
    kind: TimerKind,
    id: u64,
    _guard: DropGuard,
}

impl ScopedTimer {
    /// Starts a countdown. Must be called from within a tokio runtime.
    pub fn start(kind: TimerKind, id: u64, duration: Duration, events: EventSender) -> Self {
        let cancel_token = CancellationToken::new();
        let cancel_token_for_task = cancel_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_token_for_task.cancelled() => {
                    trace!("{:?} timer {} cancelled", kind, id);
                }
                _ = tokio::time::sleep(duration) => {
                    // the receiver is gone when the monitor has shut down
                    let _ = events.send(MonitorEvent::TimerExpired { kind, id });
                }
            }
        });

        Self {
            kind,
            id,
            _guard: cancel_token.drop_guard(),
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::events::event_channel;

    #[tokio::test(start_paused = true)]
    async fn fires_after_duration() {
        let (tx, mut rx) = event_channel();
        let _timer = ScopedTimer::start(TimerKind::Scan, 7, Duration::from_secs(5), tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, MonitorEvent::TimerExpired { kind: TimerKind::Scan, id: 7 });
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels() {
        let (tx, mut rx) = event_channel();
        let timer = ScopedTimer::start(TimerKind::Connect, 1, Duration::from_secs(5), tx);
        drop(timer);

        // the task drops its sender once cancelled, closing the channel
        assert_eq!(rx.recv().await, None);
    }
}
