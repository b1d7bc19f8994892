// src/telemetry/protocol.rs
//
// The bridge message envelope. Outbound commands and inbound control
// acknowledgements are flat JSON objects discriminated by `type`; anything
// inbound without a recognized `type` is a telemetry sample.

use serde::{Deserialize, Serialize};

/// Register poll parameters carried by read/poll commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollParams {
    #[serde(rename = "slaveId")]
    pub slave_id: u8,
    pub address: u16,
    pub count: u16,
    /// Auto-poll period in milliseconds
    pub interval: u64,
}

/// Commands the session can issue to a bridge.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Ask the bridge for its current status; sent automatically on connect
    #[serde(rename = "GET_STATUS")]
    GetStatus,
    /// One immediate read using the bridge's own register configuration
    #[serde(rename = "SEND_NOW")]
    SendNow,
    /// One immediate read of the given registers
    #[serde(rename = "SEND_ONCE")]
    SendOnce(PollParams),
    /// Recurring reads of the given registers
    #[serde(rename = "START_AUTO_POLL")]
    StartAutoPoll(PollParams),
    /// Recurring reads using the bridge's own register configuration
    #[serde(rename = "START_AUTO")]
    StartAuto,
    #[serde(rename = "STOP_AUTO")]
    StopAuto,
    #[serde(rename = "SET_INTERVAL")]
    SetInterval { interval: u64 },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetStatus => "GET_STATUS",
            Command::SendNow => "SEND_NOW",
            Command::SendOnce(_) => "SEND_ONCE",
            Command::StartAutoPoll(_) => "START_AUTO_POLL",
            Command::StartAuto => "START_AUTO",
            Command::StopAuto => "STOP_AUTO",
            Command::SetInterval { .. } => "SET_INTERVAL",
        }
    }

    pub fn to_frame(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| format!("Failed to encode command: {}", e))
    }
}

/// Control acknowledgements the bridge sends back.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "STATUS")]
    Status {
        #[serde(default)]
        interval: u64,
        #[serde(rename = "autoSending", default)]
        auto_sending: bool,
        #[serde(rename = "serialOpen", default)]
        serial_open: bool,
    },
    #[serde(rename = "INTERVAL_SET")]
    IntervalSet { interval: u64 },
    #[serde(rename = "AUTO_STARTED")]
    AutoStarted {
        #[serde(default)]
        interval: u64,
    },
    #[serde(rename = "AUTO_STOPPED")]
    AutoStopped,
}

/// A classified inbound frame.
#[derive(Clone, Debug)]
pub enum Inbound {
    Control(ControlMessage),
    /// No recognized discriminant: a telemetry sample with domain fields
    Sample(serde_json::Value),
}

/// Classify a raw frame. Unparseable text is an error; JSON with an
/// unknown or missing `type` is a sample, matching how the bridges frame
/// their data messages.
pub fn classify_frame(raw: &str) -> Result<Inbound, String> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| format!("Malformed frame: {} (raw: {})", e, raw))?;

    if value.get("type").and_then(|t| t.as_str()).is_some() {
        if let Ok(control) = serde_json::from_value::<ControlMessage>(value.clone()) {
            return Ok(Inbound::Control(control));
        }
    }

    Ok(Inbound::Sample(value))
}
