// src/stream/acquire.rs
//
// Acquire a pull address from the hub and hand it to the monitor.
// Overriding an existing stream is a separate, explicit path (`reacquire`)
// so a caller can never replace a live stream by accident.

use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::events::{Event, HubErrorPayload};
use crate::registry::Device;

use super::StreamLifecycle;

impl StreamLifecycle {
    /// Acquire a stream for a device that has none. Fails fast when the
    /// device already carries a non-sentinel pull address.
    pub async fn acquire(self: &Arc<Self>, device_id: i64) -> Result<String, String> {
        let device = self.registry.get_device(device_id).await.map_err(String::from)?;

        if device.has_stream() {
            return Err(CoreError::precondition(
                &format!("device {}", device_id),
                "Stream already provisioned; use reacquire to replace it",
            )
            .into());
        }

        self.acquire_inner(&device).await
    }

    /// Replace a device's stream: teardown, a settle delay for the hub to
    /// actually release the old session, then a fresh acquisition.
    pub async fn reacquire(self: &Arc<Self>, device_id: i64) -> Result<String, String> {
        self.teardown(device_id).await?;
        tokio::time::sleep(Duration::from_millis(self.settings.settle_delay_ms)).await;

        let device = self.registry.get_device(device_id).await.map_err(String::from)?;
        self.acquire_inner(&device).await
    }

    async fn acquire_inner(self: &Arc<Self>, device: &Device) -> Result<String, String> {
        if device.device_code.is_empty() {
            return Err(CoreError::precondition(
                &format!("device {}", device.id),
                "Device has no device code",
            )
            .into());
        }

        let pull_url = match self.hub.start_stream(device.id, &device.device_code).await {
            Ok(url) => url,
            Err(e) => {
                tlog!("[Stream:{}] Hub start failed: {}", device.id, e);
                self.bus.emit(Event::HubError(HubErrorPayload {
                    device_id: device.id,
                    operation: "start-stream".to_string(),
                    message: e.to_string(),
                }));
                return Err(e.into());
            }
        };

        self.registry
            .set_pull_url(device.id, &pull_url)
            .await
            .map_err(String::from)?;

        tlog!("[Stream:{}] Acquired pull address: {}", device.id, pull_url);
        self.start_monitor(device.id, pull_url.clone());

        Ok(pull_url)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use crate::settings::PULL_URL_SENTINEL;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_persists_url_and_starts_monitor() {
        let hub = MockHub::new();
        let registry = MockRegistry::with_devices(vec![sentinel_device(1)]);
        let ctl = fast_lifecycle(hub.clone(), registry.clone(), ScriptedProber::succeeding_from(1));

        let url = ctl.acquire(1).await.unwrap();
        assert_eq!(url, "http://hub.local/live/dev.m3u8");
        assert_eq!(registry.pull_url_of(1).unwrap(), url);
        assert_eq!(hub.start_calls.load(Ordering::Relaxed), 1);

        // The monitor resolves availability shortly after
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ctl.availability(1), Some(true));
    }

    #[tokio::test]
    async fn test_acquire_rejects_already_provisioned_device() {
        let hub = MockHub::new();
        let registry = MockRegistry::with_devices(vec![test_device(1, "http://h/live/1.m3u8")]);
        let ctl = fast_lifecycle(hub.clone(), registry, ScriptedProber::succeeding_from(1));

        let err = ctl.acquire(1).await.unwrap_err();
        assert!(err.contains("already provisioned"));
        assert_eq!(hub.start_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_acquire_rejects_missing_device_code() {
        let hub = MockHub::new();
        let mut device = sentinel_device(1);
        device.device_code = String::new();
        let registry = MockRegistry::with_devices(vec![device]);
        let ctl = fast_lifecycle(hub.clone(), registry, ScriptedProber::succeeding_from(1));

        let err = ctl.acquire(1).await.unwrap_err();
        assert!(err.contains("no device code"));
        assert_eq!(hub.start_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_acquire_hub_failure_starts_nothing() {
        let hub = MockHub::new();
        if let Ok(mut r) = hub.start_result.lock() {
            *r = Err("no capacity".to_string());
        }
        let registry = MockRegistry::with_devices(vec![sentinel_device(1)]);
        let ctl = fast_lifecycle(hub, registry.clone(), ScriptedProber::succeeding_from(1));

        assert!(ctl.acquire(1).await.is_err());
        assert!(ctl.probe_state(1).is_none());
        assert_eq!(registry.pull_url_of(1).unwrap(), PULL_URL_SENTINEL);
    }

    #[tokio::test]
    async fn test_reacquire_tears_down_then_acquires_under_new_epoch() {
        let hub = MockHub::new();
        let registry = MockRegistry::with_devices(vec![test_device(1, "http://h/live/old.m3u8")]);
        let ctl = fast_lifecycle(hub.clone(), registry.clone(), ScriptedProber::succeeding_from(1));

        // A monitor is running for the old address
        ctl.start_monitor(1, "http://h/live/old.m3u8".to_string());
        let old_epoch = ctl.probe_state(1).map(|s| s.epoch);

        let url = ctl.reacquire(1).await.unwrap();
        assert_eq!(hub.stops(), 1);
        assert_eq!(hub.start_calls.load(Ordering::Relaxed), 1);
        assert_eq!(registry.pull_url_of(1).unwrap(), url);

        if let (Some(old), Some(state)) = (old_epoch, ctl.probe_state(1)) {
            assert!(state.epoch > old);
        }
    }
}
