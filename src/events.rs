//! Job progress events.
//!
//! The job runner emits via [`EventBus::emit`]; the CLI subscribes via
//! [`EventBus::subscribe`] to render progress. Built on
//! [`tokio::sync::broadcast`] so a slow or absent listener never blocks a job.

use tokio::sync::broadcast;

use crate::backend::RunStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A run was launched on a fresh thread.
    JobStarted { thread_id: String, run_id: String },
    /// A status check returned (`polls` counts checks so far, from 1).
    JobStatus {
        run_id: String,
        status: RunStatus,
        polls: u32,
    },
    /// The run reached a terminal status.
    JobFinished { run_id: String, status: RunStatus },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns the number of receivers that will see the event.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Yields future events only, never past ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(Event::JobStatus {
            run_id: "run_1".to_string(),
            status: RunStatus::Queued,
            polls: 1,
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            Event::JobStatus {
                run_id: "run_1".to_string(),
                status: RunStatus::Queued,
                polls: 1,
            }
        );
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        let count = bus.emit(Event::JobFinished {
            run_id: "run_1".to_string(),
            status: RunStatus::Completed,
        });
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::default();
        bus.emit(Event::JobStarted {
            thread_id: "t".to_string(),
            run_id: "r".to_string(),
        });
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
