// src/telemetry/mod.rs
//
// Long-lived command/telemetry sessions to sensor bridges. Each sensor kind
// speaks the same JSON envelope on its own WebSocket port.

pub mod buffer;
pub mod protocol;
pub mod session;
pub mod transport;

use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;

/// The instrument families the dashboard talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SensorKind {
    /// Iron-core grounding current monitor
    IronCore,
    /// Transformer partial-discharge monitor
    PartialDischarge,
    /// Micro-water (moisture-in-oil) monitor
    MicroWater,
}

impl SensorKind {
    /// Bridge port used when the operator omits one.
    pub fn default_port(&self) -> u16 {
        match self {
            SensorKind::IronCore => 8080,
            SensorKind::PartialDischarge => 8081,
            SensorKind::MicroWater => 8082,
        }
    }

    /// Register poll parameters preloaded for the kind's instrument, when
    /// it is register-based at all (the iron-core bridge handles registers
    /// itself and only takes an interval).
    pub fn default_poll(&self) -> Option<protocol::PollParams> {
        match self {
            SensorKind::IronCore => None,
            SensorKind::PartialDischarge => Some(protocol::PollParams {
                slave_id: 1,
                address: 101,
                count: 11,
                interval: 5000,
            }),
            SensorKind::MicroWater => Some(protocol::PollParams {
                slave_id: 1,
                address: 129,
                count: 9,
                interval: 5000,
            }),
        }
    }

    /// Session URL for a bridge running on this machine.
    pub fn local_url(&self) -> String {
        format!("ws://localhost:{}", self.default_port())
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::IronCore => "iron-core",
            SensorKind::PartialDischarge => "partial-discharge",
            SensorKind::MicroWater => "micro-water",
        }
    }
}

/// Turn an operator-entered `ipv4[:port]` into a session URL, filling in
/// the kind's default port.
pub fn parse_bridge_addr(input: &str, kind: SensorKind) -> Result<String, CoreError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CoreError::precondition("bridge", "Bridge address is empty"));
    }

    let (ip_part, port) = match input.split_once(':') {
        Some((ip, port_str)) => {
            let port: u16 = port_str.parse().map_err(|_| {
                CoreError::precondition("bridge", format!("Invalid port: {}", port_str))
            })?;
            (ip, port)
        }
        None => (input, kind.default_port()),
    };

    let ip = std::net::Ipv4Addr::from_str(ip_part).map_err(|_| {
        CoreError::precondition(
            "bridge",
            format!("Invalid IPv4 address: {} (expected e.g. 192.168.1.1 or 192.168.1.1:{})",
                ip_part,
                kind.default_port()),
        )
    })?;

    Ok(format!("ws://{}:{}", ip, port))
}
