// src/telemetry/session.rs
//
// Session state machine for one sensor bridge. Commands go out only while
// connected; state that the bridge owns (autoSending, serialOpen, interval)
// changes only on bridge acknowledgement, so the dashboard always shows
// device-reported truth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::events::{
    ControlAckPayload, DataFormatErrorPayload, Event, EventBus, SessionStatePayload,
};
use crate::settings::AppSettings;

use super::buffer::{Sample, SampleBuffers};
use super::protocol::{classify_frame, Command, ControlMessage, Inbound, PollParams};
use super::transport::{BridgeTransport, TransportEvent};
use super::{parse_bridge_addr, SensorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view of the session for the dashboard.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub auto_sending: bool,
    pub serial_open: bool,
    pub send_interval: u64,
    pub poll: Option<PollParams>,
}

struct Inner {
    connection: ConnectionState,
    auto_sending: bool,
    serial_open: bool,
    send_interval: u64,
    poll: Option<PollParams>,
    buffers: SampleBuffers,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

pub struct TelemetrySession {
    pub kind: SensorKind,
    pub session_id: String,
    transport: Arc<dyn BridgeTransport>,
    bus: EventBus,
    inner: Mutex<Inner>,
    /// Bumped on every connect/disconnect; a pump from a superseded
    /// connection sees the mismatch and exits without touching state.
    generation: AtomicU64,
}

impl TelemetrySession {
    pub fn new(
        kind: SensorKind,
        transport: Arc<dyn BridgeTransport>,
        bus: EventBus,
        settings: &AppSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            session_id: format!("{}-{}", kind.name(), uuid::Uuid::new_v4()),
            transport,
            bus,
            inner: Mutex::new(Inner {
                connection: ConnectionState::Disconnected,
                auto_sending: false,
                serial_open: false,
                send_interval: 5000,
                poll: kind.default_poll(),
                buffers: SampleBuffers::new(settings.chart_capacity),
                outbound: None,
            }),
            generation: AtomicU64::new(0),
        })
    }

    // ===== Connection lifecycle =====

    /// Connect to an operator-entered `ipv4[:port]` bridge address.
    pub async fn connect(self: &Arc<Self>, addr: &str) -> Result<(), String> {
        let url = parse_bridge_addr(addr, self.kind).map_err(String::from)?;
        self.connect_url(&url).await
    }

    /// Connect to a bridge on this machine.
    pub async fn connect_local(self: &Arc<Self>) -> Result<(), String> {
        let url = self.kind.local_url();
        self.connect_url(&url).await
    }

    pub async fn connect_url(self: &Arc<Self>, url: &str) -> Result<(), String> {
        // Supersede any prior connection before opening a new one, so two
        // transports never deliver samples at once
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut inner) = self.inner.lock() {
            inner.outbound = None;
            inner.connection = ConnectionState::Connecting;
            inner.auto_sending = false;
            inner.buffers.clear();
        }

        tlog!("[{}:{}] Connecting to {}", self.kind.name(), self.session_id, url);

        let link = match self.transport.open(url).await {
            Ok(link) => link,
            Err(e) => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.connection = ConnectionState::Disconnected;
                }
                tlog!(
                    "[{}:{}] Connect failed: {}",
                    self.kind.name(),
                    self.session_id,
                    e
                );
                return Err(e.into());
            }
        };

        if let Ok(mut inner) = self.inner.lock() {
            inner.outbound = Some(link.outbound);
        }

        let session = Arc::clone(self);
        let mut events = link.events;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if session.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                if !session.apply_transport_event(event) {
                    return;
                }
            }
        });

        Ok(())
    }

    /// Explicitly close the session. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.apply_disconnect();
    }

    /// Returns false when the pump should stop.
    fn apply_transport_event(self: &Arc<Self>, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Opened => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.connection = ConnectionState::Connected;
                    inner.buffers.clear();
                }
                tlog!("[{}:{}] Connected", self.kind.name(), self.session_id);
                self.bus.emit(Event::SessionState(SessionStatePayload {
                    session_id: self.session_id.clone(),
                    connected: true,
                }));
                // Ask for the bridge's state right away so the dashboard
                // starts from reported truth
                if let Err(e) = self.send(Command::GetStatus) {
                    tlog!(
                        "[{}:{}] Initial status request failed: {}",
                        self.kind.name(),
                        self.session_id,
                        e
                    );
                }
                true
            }
            TransportEvent::Frame(raw) => {
                self.handle_frame(&raw);
                true
            }
            TransportEvent::Closed => {
                tlog!("[{}:{}] Bridge closed the session", self.kind.name(), self.session_id);
                self.apply_disconnect();
                false
            }
            TransportEvent::Error(message) => {
                tlog!(
                    "[{}:{}] Transport error: {}",
                    self.kind.name(),
                    self.session_id,
                    message
                );
                self.apply_disconnect();
                false
            }
        }
    }

    fn apply_disconnect(&self) {
        let was_connected = if let Ok(mut inner) = self.inner.lock() {
            let was = inner.connection != ConnectionState::Disconnected;
            inner.connection = ConnectionState::Disconnected;
            // The bridge can no longer tell us otherwise; reset locally
            // pending the next status refresh
            inner.auto_sending = false;
            inner.outbound = None;
            was
        } else {
            false
        };

        if was_connected {
            self.bus.emit(Event::SessionState(SessionStatePayload {
                session_id: self.session_id.clone(),
                connected: false,
            }));
        }
    }

    // ===== Commands =====

    /// Send a command to the bridge. Rejected locally, with no network
    /// attempt, unless the session is connected.
    pub fn send(&self, command: Command) -> Result<(), String> {
        let frame = command.to_frame()?;
        let inner = self
            .inner
            .lock()
            .map_err(|_| "Session state unavailable".to_string())?;

        if inner.connection != ConnectionState::Connected {
            return Err(CoreError::precondition(
                &format!("session {}", self.session_id),
                format!("Not connected; cannot send {}", command.name()),
            )
            .into());
        }

        let outbound = inner.outbound.as_ref().ok_or_else(|| {
            String::from(CoreError::precondition(
                &format!("session {}", self.session_id),
                "No transport attached",
            ))
        })?;

        outbound
            .send(frame)
            .map_err(|_| "Session transport is gone".to_string())
    }

    /// One immediate read with the session's poll parameters (register-based
    /// kinds) or the bridge's own configuration (iron-core).
    pub fn send_once(&self) -> Result<(), String> {
        match self.poll_params() {
            Some(poll) => self.send(Command::SendOnce(poll)),
            None => self.send(Command::SendNow),
        }
    }

    /// Start recurring reads; acknowledged by `AUTO_STARTED`.
    pub fn start_auto(&self) -> Result<(), String> {
        match self.poll_params() {
            Some(poll) => self.send(Command::StartAutoPoll(poll)),
            None => self.send(Command::StartAuto),
        }
    }

    /// Stop recurring reads; acknowledged by `AUTO_STOPPED`.
    pub fn stop_auto(&self) -> Result<(), String> {
        self.send(Command::StopAuto)
    }

    /// Ask the bridge to change its send interval; acknowledged by
    /// `INTERVAL_SET`.
    pub fn set_interval(&self, interval: u64) -> Result<(), String> {
        self.send(Command::SetInterval { interval })
    }

    /// Update the poll parameters used by subsequent read commands.
    pub fn set_poll_params(&self, poll: PollParams) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.poll = Some(poll);
        }
    }

    // ===== Inbound =====

    fn handle_frame(&self, raw: &str) {
        let inbound = match classify_frame(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                tlog!("[{}:{}] {}", self.kind.name(), self.session_id, e);
                self.bus.emit(Event::DataFormatError(DataFormatErrorPayload {
                    session_id: self.session_id.clone(),
                    raw: raw.to_string(),
                }));
                return;
            }
        };

        match inbound {
            Inbound::Control(control) => self.apply_control(control),
            Inbound::Sample(sample) => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.buffers.push(sample);
                }
            }
        }
    }

    fn apply_control(&self, control: ControlMessage) {
        let (ack, detail) = match control {
            ControlMessage::Status {
                interval,
                auto_sending,
                serial_open,
            } => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.send_interval = interval;
                    inner.auto_sending = auto_sending;
                    inner.serial_open = serial_open;
                }
                (
                    "STATUS",
                    format!(
                        "interval={}ms autoSending={} serialOpen={}",
                        interval, auto_sending, serial_open
                    ),
                )
            }
            ControlMessage::IntervalSet { interval } => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.send_interval = interval;
                }
                ("INTERVAL_SET", format!("Send interval set to {}ms", interval))
            }
            ControlMessage::AutoStarted { interval } => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.auto_sending = true;
                    if interval > 0 {
                        inner.send_interval = interval;
                    }
                }
                ("AUTO_STARTED", format!("Auto send started ({}ms)", interval))
            }
            ControlMessage::AutoStopped => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.auto_sending = false;
                }
                ("AUTO_STOPPED", "Auto send stopped".to_string())
            }
        };

        tlog!("[{}:{}] {}: {}", self.kind.name(), self.session_id, ack, detail);
        self.bus.emit(Event::ControlAck(ControlAckPayload {
            session_id: self.session_id.clone(),
            ack: ack.to_string(),
            detail,
        }));
    }

    // ===== Views =====

    pub fn state(&self) -> ConnectionState {
        self.inner
            .lock()
            .map(|inner| inner.connection)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match self.inner.lock() {
            Ok(inner) => SessionSnapshot {
                connection: inner.connection,
                auto_sending: inner.auto_sending,
                serial_open: inner.serial_open,
                send_interval: inner.send_interval,
                poll: inner.poll,
            },
            Err(_) => SessionSnapshot {
                connection: ConnectionState::Disconnected,
                auto_sending: false,
                serial_open: false,
                send_interval: 0,
                poll: None,
            },
        }
    }

    fn poll_params(&self) -> Option<PollParams> {
        self.inner.lock().ok().and_then(|inner| inner.poll)
    }

    /// Chart window, oldest first.
    pub fn chart_samples(&self) -> Vec<Sample> {
        self.inner
            .lock()
            .map(|inner| inner.buffers.chart().cloned().collect())
            .unwrap_or_default()
    }

    /// Full history, newest first.
    pub fn table_samples(&self) -> Vec<Sample> {
        self.inner
            .lock()
            .map(|inner| inner.buffers.table().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.buffers.latest().cloned())
    }
}
