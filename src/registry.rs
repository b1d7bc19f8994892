// src/registry.rs
//
// Device records and the registry port. The registry itself (relational
// store, CRUD surface) lives behind the dashboard API; the core only reads
// records and writes pull addresses through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::settings::PULL_URL_SENTINEL;

/// One monitored device as the registry reports it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub device_code: String,
    pub device_name: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub push_url: String,
    #[serde(default = "sentinel")]
    pub pull_url: String,
    /// true when the device last reported in
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub install_time: String,
}

fn sentinel() -> String {
    PULL_URL_SENTINEL.to_string()
}

impl Device {
    /// Whether a stream has been provisioned for this device.
    pub fn has_stream(&self) -> bool {
        !self.pull_url.is_empty() && self.pull_url != PULL_URL_SENTINEL
    }
}

/// Read/write access to the device table, scoped to what the stream
/// lifecycle needs.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>, CoreError>;

    async fn get_device(&self, device_id: i64) -> Result<Device, CoreError>;

    /// Persist a pull address (or the sentinel, on teardown).
    async fn set_pull_url(&self, device_id: i64, pull_url: &str) -> Result<(), CoreError>;
}

/// Registry implementation against the dashboard API.
pub struct HttpDeviceRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDeviceRegistry {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DeviceRegistry for HttpDeviceRegistry {
    async fn list_devices(&self) -> Result<Vec<Device>, CoreError> {
        let url = format!("{}/devices", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::connection("registry", format!("GET {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(CoreError::protocol(
                "registry",
                format!("GET {} returned {}", url, resp.status()),
            ));
        }

        resp.json::<Vec<Device>>()
            .await
            .map_err(|e| CoreError::protocol("registry", format!("Bad device list: {}", e)))
    }

    async fn get_device(&self, device_id: i64) -> Result<Device, CoreError> {
        let target = format!("registry(device {})", device_id);
        let devices = self.list_devices().await?;
        devices
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| CoreError::precondition(&target, "Unknown device id"))
    }

    async fn set_pull_url(&self, device_id: i64, pull_url: &str) -> Result<(), CoreError> {
        let target = format!("registry(device {})", device_id);
        let url = format!("{}/devices/{}/stream-url", self.base_url, device_id);
        let body = serde_json::json!({ "pull_url": pull_url });

        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::connection(&target, format!("PUT {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(CoreError::protocol(
                &target,
                format!("PUT {} returned {}", url, resp.status()),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_stream_on_sentinel_and_empty() {
        let mut d = Device {
            id: 1,
            device_code: "TX-01".into(),
            device_name: "Main transformer".into(),
            province: String::new(),
            city: String::new(),
            location: String::new(),
            push_url: String::new(),
            pull_url: PULL_URL_SENTINEL.into(),
            status: true,
            install_time: String::new(),
        };
        assert!(!d.has_stream());

        d.pull_url = String::new();
        assert!(!d.has_stream());

        d.pull_url = "http://hub.local/live/tx-01.m3u8".into();
        assert!(d.has_stream());
    }

    #[test]
    fn test_device_deserialize_fills_sentinel() {
        let d: Device = serde_json::from_str(
            r#"{"id": 3, "device_code": "TX-03", "device_name": "Spare", "status": false}"#,
        )
        .unwrap();
        assert_eq!(d.pull_url, PULL_URL_SENTINEL);
        assert!(!d.has_stream());
    }
}
