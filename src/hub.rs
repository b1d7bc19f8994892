// src/hub.rs
//
// Port to the external streaming hub, reached through the dashboard API.
// Start hands back a pull address; stop releases it on the hub side.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreError;

#[async_trait]
pub trait StreamHub: Send + Sync {
    /// Ask the hub to start streaming for a device, returning the pull address.
    async fn start_stream(&self, device_id: i64, device_code: &str) -> Result<String, CoreError>;

    /// Ask the hub to stop streaming for a device.
    async fn stop_stream(&self, device_code: &str) -> Result<(), CoreError>;
}

#[derive(Deserialize)]
struct StartStreamResponse {
    #[serde(rename = "streamUrl")]
    stream_url: String,
}

#[derive(Deserialize)]
struct StopStreamResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
}

pub struct HttpStreamHub {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStreamHub {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StreamHub for HttpStreamHub {
    async fn start_stream(&self, device_id: i64, device_code: &str) -> Result<String, CoreError> {
        let target = format!("hub(device {})", device_id);
        let url = format!("{}/devices/{}/stream-url", self.base_url, device_id);
        let body = serde_json::json!({ "device_code": device_code });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::connection(&target, format!("POST {}: {}", url, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::protocol(
                &target,
                format!("Start stream returned {}: {}", status, text),
            ));
        }

        let parsed: StartStreamResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::protocol(&target, format!("Bad start response: {}", e)))?;

        if parsed.stream_url.is_empty() {
            return Err(CoreError::protocol(&target, "Hub returned an empty stream URL"));
        }

        Ok(parsed.stream_url)
    }

    async fn stop_stream(&self, device_code: &str) -> Result<(), CoreError> {
        let target = format!("hub({})", device_code);
        let url = format!("{}/devices/stop-stream", self.base_url);
        let body = serde_json::json!({ "deviceCode": device_code });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::connection(&target, format!("POST {}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(CoreError::protocol(
                &target,
                format!("Stop stream returned {}", resp.status()),
            ));
        }

        let parsed: StopStreamResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::protocol(&target, format!("Bad stop response: {}", e)))?;

        if !parsed.success {
            return Err(CoreError::protocol(
                &target,
                format!("Hub reported stop failure: {}", parsed.message),
            ));
        }

        Ok(())
    }
}
