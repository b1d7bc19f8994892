// src/stream/monitor.rs
//
// Per-device availability monitor and the coarse background sweep.
// One task per (device, epoch); results land through the epoch-checked
// commit methods on the controller, so a superseded task can never write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::events::{Event, StreamReadyPayload, StreamTimedOutPayload};

use super::StreamLifecycle;

impl StreamLifecycle {
    /// Start monitoring a pull address under a fresh epoch. Any prior
    /// monitor for the device is cancelled and superseded.
    pub fn start_monitor(self: &Arc<Self>, device_id: i64, pull_url: String) {
        let (epoch, cancel_flag) = self.begin_epoch(device_id);
        let ctl = Arc::clone(self);

        tokio::spawn(async move {
            ctl.run_monitor(device_id, pull_url, epoch, cancel_flag).await;
        });
    }

    async fn run_monitor(
        self: Arc<Self>,
        device_id: i64,
        pull_url: String,
        epoch: u64,
        cancel_flag: Arc<AtomicBool>,
    ) {
        let max_attempts = self.settings.probe_max_attempts;
        let mut timer = interval(Duration::from_millis(self.settings.probe_interval_ms));
        let mut attempts: u32 = 0;

        tlog!(
            "[Stream:{}] Monitor started (epoch {}): {} every {}ms, budget {}",
            device_id,
            epoch,
            pull_url,
            self.settings.probe_interval_ms,
            max_attempts
        );

        loop {
            timer.tick().await;

            if cancel_flag.load(Ordering::Relaxed) {
                tlog!("[Stream:{}] Monitor cancelled (epoch {})", device_id, epoch);
                return;
            }

            attempts += 1;

            // Timeouts and refusals are the same as "not ready yet";
            // every failure counts toward the budget.
            let ready = match self.prober.probe(&pull_url).await {
                Ok(()) => true,
                Err(e) => {
                    tlog!(
                        "[Stream:{}] Probe attempt {}/{} failed: {}",
                        device_id,
                        attempts,
                        max_attempts,
                        e
                    );
                    false
                }
            };

            if ready {
                if !self.resolve_epoch(device_id, epoch, attempts, true) {
                    tlog!(
                        "[Stream:{}] Discarding stale ready result (epoch {})",
                        device_id,
                        epoch
                    );
                    return;
                }
                self.bus.emit(Event::StreamReady(StreamReadyPayload {
                    device_id,
                    pull_url,
                    attempt: attempts,
                }));
                return;
            }

            if attempts >= max_attempts {
                if !self.resolve_epoch(device_id, epoch, attempts, false) {
                    tlog!(
                        "[Stream:{}] Discarding stale exhaustion result (epoch {})",
                        device_id,
                        epoch
                    );
                    return;
                }
                self.bus.emit(Event::StreamTimedOut(StreamTimedOutPayload {
                    device_id,
                    attempts,
                }));
                if let Err(e) = self.teardown(device_id).await {
                    tlog!(
                        "[Stream:{}] Automatic teardown after exhaustion failed: {}",
                        device_id,
                        e
                    );
                }
                return;
            }

            if !self.commit_attempt(device_id, epoch, attempts) {
                // The entry was replaced or torn down while we probed
                return;
            }
        }
    }

    /// Spawn the coarse background sweep: every `sweep_interval_ms`, probe
    /// each provisioned device that has no active monitor and refresh the
    /// availability map. Returns a flag that stops the sweep when set.
    pub fn spawn_background_sweep(self: &Arc<Self>) -> Arc<AtomicBool> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let ctl = Arc::clone(self);

        tokio::spawn(async move {
            let mut timer = interval(Duration::from_millis(ctl.settings.sweep_interval_ms));
            tlog!(
                "[Sweep] Background availability sweep started ({}ms)",
                ctl.settings.sweep_interval_ms
            );

            loop {
                timer.tick().await;

                if flag.load(Ordering::Relaxed) {
                    tlog!("[Sweep] Background availability sweep stopped");
                    return;
                }

                let devices = match ctl.registry.list_devices().await {
                    Ok(devices) => devices,
                    Err(e) => {
                        tlog!("[Sweep] Device list fetch failed: {}", e);
                        continue;
                    }
                };

                for device in devices.iter().filter(|d| d.has_stream()) {
                    // Devices under active monitoring are the monitor's business
                    if ctl.probe_state(device.id).is_some() {
                        continue;
                    }
                    let available = ctl.prober.probe(&device.pull_url).await.is_ok();
                    ctl.set_availability(device.id, available);
                }
            }
        });

        stop_flag
    }
}
