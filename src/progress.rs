//! Terminal spinner for long-running calls, labelled from job events.

use std::io::Write;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::events::Event;

/// Braille spinner frames.
const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const INTERVAL: Duration = Duration::from_millis(80);

/// A spinner on stderr, running in a background task, so stdout stays
/// clean for the JSON result.
pub struct Progress {
    handle: JoinHandle<()>,
    cancel: tokio::sync::watch::Sender<bool>,
}

impl Progress {
    /// Start with `message`; when `events` is given, job events refine it.
    pub fn start(message: &str, mut events: Option<broadcast::Receiver<Event>>) -> Self {
        let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);
        let message = message.to_string();

        let handle = tokio::spawn(async move {
            let mut label = message.clone();
            let mut i = 0;
            loop {
                let frame = FRAMES[i % FRAMES.len()];
                eprint!("\x1b[2K\r{frame} {label}");
                let _ = std::io::stderr().flush();

                let event = tokio::select! {
                    _ = tokio::time::sleep(INTERVAL) => {
                        i += 1;
                        continue;
                    }
                    _ = cancel_rx.changed() => break,
                    event = next_event(&mut events) => event,
                };
                match event {
                    Some(event) => label = describe(&message, &event),
                    None => events = None,
                }
            }
            eprint!("\x1b[2K\r");
            let _ = std::io::stderr().flush();
        });

        Self {
            handle,
            cancel: cancel_tx,
        }
    }

    /// Stop the spinner and clear its line.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }
}

/// Next event, skipping over lag. Never resolves without a receiver.
async fn next_event(events: &mut Option<broadcast::Receiver<Event>>) -> Option<Event> {
    let Some(rx) = events else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}

fn describe(message: &str, event: &Event) -> String {
    match event {
        Event::JobStarted { .. } => format!("{message} (run launched)"),
        Event::JobStatus { status, polls, .. } => {
            format!("{message} ({}, check {polls})", status.as_str())
        }
        Event::JobFinished { status, .. } => format!("{message} ({})", status.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RunStatus;
    use crate::events::EventBus;

    #[test]
    fn frames_are_single_braille_chars() {
        for frame in FRAMES {
            assert_eq!(frame.chars().count(), 1);
        }
    }

    #[test]
    fn describe_status_event() {
        let event = Event::JobStatus {
            run_id: "run_1".to_string(),
            status: RunStatus::InProgress,
            polls: 3,
        };
        assert_eq!(describe("thinking", &event), "thinking (in_progress, check 3)");
    }

    #[tokio::test]
    async fn starts_and_stops_without_events() {
        let progress = Progress::start("testing", None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        progress.stop().await;
    }

    #[tokio::test]
    async fn survives_closed_event_bus() {
        let bus = EventBus::default();
        let progress = Progress::start("testing", Some(bus.subscribe()));
        drop(bus);
        tokio::time::sleep(Duration::from_millis(100)).await;
        progress.stop().await;
    }
}
