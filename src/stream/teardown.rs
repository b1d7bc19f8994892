// src/stream/teardown.rs
//
// Stop a device's stream: cancel the monitor first so no further probe
// results can land, release playback if it pointed here, then the hub stop
// call, then reset the persisted pull address to the sentinel.

use crate::events::{Event, HubErrorPayload, StreamStoppedPayload};
use crate::settings::PULL_URL_SENTINEL;

use super::StreamLifecycle;

impl StreamLifecycle {
    /// Tear down a device's stream. Idempotent: on a device whose pull
    /// address is already the sentinel, the hub is not called and local
    /// state is merely normalized.
    pub async fn teardown(&self, device_id: i64) -> Result<(), String> {
        self.cancel_monitor(device_id);

        if self.release_playback_if(device_id) {
            self.bus
                .emit(Event::PlaybackReleased(StreamStoppedPayload { device_id }));
        }

        let device = self.registry.get_device(device_id).await.map_err(String::from)?;

        if !device.has_stream() {
            tlog!("[Stream:{}] Teardown on unprovisioned device, normalizing", device_id);
            self.set_availability(device_id, false);
            if device.pull_url != PULL_URL_SENTINEL {
                self.registry
                    .set_pull_url(device_id, PULL_URL_SENTINEL)
                    .await
                    .map_err(String::from)?;
            }
            return Ok(());
        }

        if let Err(e) = self.hub.stop_stream(&device.device_code).await {
            tlog!("[Stream:{}] Hub stop failed: {}", device_id, e);
            self.bus.emit(Event::HubError(HubErrorPayload {
                device_id,
                operation: "stop-stream".to_string(),
                message: e.to_string(),
            }));
            return Err(e.into());
        }

        self.registry
            .set_pull_url(device_id, PULL_URL_SENTINEL)
            .await
            .map_err(String::from)?;
        self.set_availability(device_id, false);

        tlog!("[Stream:{}] Stream stopped and pull address reset", device_id);
        self.bus
            .emit(Event::StreamStopped(StreamStoppedPayload { device_id }));

        Ok(())
    }
}
