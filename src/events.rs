// src/events.rs
//
// Notification bus between the coordination core and the dashboard shell.
// Payloads are serde-serializable so the shell can forward them verbatim.

use serde::Serialize;
use tokio::sync::broadcast;

/// How a notification should be presented.
/// Transient notices disappear on their own; dismissable ones stay until
/// the operator acts on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    Transient,
    Dismissable,
}

#[derive(Clone, Debug, Serialize)]
pub struct StreamReadyPayload {
    pub device_id: i64,
    pub pull_url: String,
    pub attempt: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct StreamTimedOutPayload {
    pub device_id: i64,
    pub attempts: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct StreamStoppedPayload {
    pub device_id: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct HubErrorPayload {
    pub device_id: i64,
    pub operation: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ControlAckPayload {
    pub session_id: String,
    pub ack: String,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionStatePayload {
    pub session_id: String,
    pub connected: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct DataFormatErrorPayload {
    pub session_id: String,
    pub raw: String,
}

/// Everything the core reports upward.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    /// A monitored stream passed its availability probe
    StreamReady(StreamReadyPayload),
    /// The probe budget ran out; automatic teardown was triggered
    StreamTimedOut(StreamTimedOutPayload),
    /// A stream was stopped (explicitly or automatically)
    StreamStopped(StreamStoppedPayload),
    /// The torn-down device was the one being played back
    PlaybackReleased(StreamStoppedPayload),
    /// The external hub rejected an acquire/stop call
    HubError(HubErrorPayload),
    /// A telemetry session transitioned to/from connected
    SessionState(SessionStatePayload),
    /// The bridge acknowledged a control command
    ControlAck(ControlAckPayload),
    /// An inbound session payload could not be parsed
    DataFormatError(DataFormatErrorPayload),
}

impl Event {
    pub fn severity(&self) -> Severity {
        match self {
            Event::StreamReady(_)
            | Event::SessionState(_)
            | Event::ControlAck(_)
            | Event::DataFormatError(_) => Severity::Transient,
            Event::StreamTimedOut(_)
            | Event::StreamStopped(_)
            | Event::PlaybackReleased(_)
            | Event::HubError(_) => Severity::Dismissable,
        }
    }
}

/// Broadcast bus the shell subscribes to.
/// Emitting with no subscribers is fine; events are simply dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // A send error only means nobody is listening right now
        let _ = self.tx.send(event);
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
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(Event::StreamStopped(StreamStoppedPayload { device_id: 7 }));
        match rx.recv().await.unwrap() {
            Event::StreamStopped(p) => assert_eq!(p.device_id, 7),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.emit(Event::StreamTimedOut(StreamTimedOutPayload {
            device_id: 1,
            attempts: 8,
        }));
    }

    #[test]
    fn test_severity_split() {
        let ready = Event::StreamReady(StreamReadyPayload {
            device_id: 1,
            pull_url: "http://h/live/1.m3u8".into(),
            attempt: 3,
        });
        let timed_out = Event::StreamTimedOut(StreamTimedOutPayload {
            device_id: 1,
            attempts: 8,
        });
        assert_eq!(ready.severity(), Severity::Transient);
        assert_eq!(timed_out.severity(), Severity::Dismissable);
    }
}
