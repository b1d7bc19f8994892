// src/stream/mod.rs
//
// Stream lifecycle: acquire a pull address from the hub, monitor it until it
// is genuinely playable, and tear it down on exhaustion or request. All
// per-device state lives on the controller; the monitor tasks only touch it
// through epoch-checked commits.

pub mod acquire;
pub mod monitor;
pub mod probe;
pub mod teardown;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::events::EventBus;
use crate::hub::StreamHub;
use crate::registry::DeviceRegistry;
use crate::settings::AppSettings;
use self::probe::StreamProber;

/// Probe bookkeeping for one device under active monitoring.
#[derive(Clone, Debug)]
pub struct ProbeState {
    pub device_id: i64,
    /// Token distinguishing this acquisition from earlier ones for the same
    /// device. A probe result carrying a different epoch is discarded.
    pub epoch: u64,
    pub attempts: u32,
    /// None until the monitor resolves either way
    pub available: Option<bool>,
    pub cancel_flag: Arc<AtomicBool>,
}

impl ProbeState {
    fn new(device_id: i64, epoch: u64, cancel_flag: Arc<AtomicBool>) -> Self {
        Self {
            device_id,
            epoch,
            attempts: 0,
            available: None,
            cancel_flag,
        }
    }
}

/// Owns every per-device probe state and the playback selection.
/// Mutation happens only through the methods here, so a monitor task can
/// never write past a teardown that already replaced or removed its entry.
pub struct StreamLifecycle {
    pub(crate) settings: AppSettings,
    pub(crate) hub: Arc<dyn StreamHub>,
    pub(crate) registry: Arc<dyn DeviceRegistry>,
    pub(crate) prober: Arc<dyn StreamProber>,
    pub(crate) bus: EventBus,

    states: Mutex<HashMap<i64, ProbeState>>,
    /// Last resolved availability per device, fed by monitors and the sweep
    availability: Mutex<HashMap<i64, bool>>,
    /// Device currently selected for playback, if any
    playback: Mutex<Option<i64>>,
    epoch_counter: AtomicU64,
}

impl StreamLifecycle {
    pub fn new(
        settings: AppSettings,
        hub: Arc<dyn StreamHub>,
        registry: Arc<dyn DeviceRegistry>,
        prober: Arc<dyn StreamProber>,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            hub,
            registry,
            prober,
            bus,
            states: Mutex::new(HashMap::new()),
            availability: Mutex::new(HashMap::new()),
            playback: Mutex::new(None),
            epoch_counter: AtomicU64::new(0),
        })
    }

    // ===== Probe state map =====

    /// Snapshot of a device's probe state, if it is being monitored.
    pub fn probe_state(&self, device_id: i64) -> Option<ProbeState> {
        self.states
            .lock()
            .ok()?
            .get(&device_id)
            .cloned()
    }

    /// Register a fresh probe state under a new epoch, cancelling any prior
    /// monitor for the device. Returns (epoch, cancel_flag) for the new task.
    pub(crate) fn begin_epoch(&self, device_id: i64) -> (u64, Arc<AtomicBool>) {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel_flag = Arc::new(AtomicBool::new(false));

        if let Ok(mut states) = self.states.lock() {
            if let Some(old) = states.insert(
                device_id,
                ProbeState::new(device_id, epoch, cancel_flag.clone()),
            ) {
                old.cancel_flag.store(true, Ordering::Relaxed);
                tlog!(
                    "[Stream:{}] Superseding monitor epoch {} with epoch {}",
                    device_id,
                    old.epoch,
                    epoch
                );
            }
        }

        (epoch, cancel_flag)
    }

    /// Cancel and drop the device's monitor state, if any. Availability is
    /// left to the caller.
    pub(crate) fn cancel_monitor(&self, device_id: i64) {
        if let Ok(mut states) = self.states.lock() {
            if let Some(state) = states.remove(&device_id) {
                state.cancel_flag.store(true, Ordering::Relaxed);
                tlog!(
                    "[Stream:{}] Monitor cancelled at attempt {} (epoch {})",
                    device_id,
                    state.attempts,
                    state.epoch
                );
            }
        }
    }

    /// Record a probe attempt if the state entry still belongs to `epoch`.
    /// Returns false when the result is stale and must be discarded.
    pub(crate) fn commit_attempt(&self, device_id: i64, epoch: u64, attempts: u32) -> bool {
        if let Ok(mut states) = self.states.lock() {
            if let Some(state) = states.get_mut(&device_id) {
                if state.epoch == epoch {
                    state.attempts = attempts;
                    return true;
                }
            }
        }
        false
    }

    /// Resolve the monitor for `epoch`: set availability, remove the state
    /// entry. Returns false when the entry no longer carries this epoch.
    pub(crate) fn resolve_epoch(
        &self,
        device_id: i64,
        epoch: u64,
        attempts: u32,
        available: bool,
    ) -> bool {
        let resolved = match self.states.lock() {
            Ok(mut states) => match states.get(&device_id) {
                Some(state) if state.epoch == epoch => {
                    states.remove(&device_id);
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };

        if resolved {
            self.set_availability(device_id, available);
            tlog!(
                "[Stream:{}] Monitor resolved after {} attempt(s): available={}",
                device_id,
                attempts,
                available
            );
        }
        resolved
    }

    // ===== Availability map =====

    pub fn availability(&self, device_id: i64) -> Option<bool> {
        self.availability.lock().ok()?.get(&device_id).copied()
    }

    pub(crate) fn set_availability(&self, device_id: i64, available: bool) {
        if let Ok(mut map) = self.availability.lock() {
            map.insert(device_id, available);
        }
    }

    // ===== Playback selection =====

    /// Mark a device as the one currently being played back.
    pub fn select_playback(&self, device_id: i64) {
        if let Ok(mut playback) = self.playback.lock() {
            *playback = Some(device_id);
        }
    }

    pub fn playback_device(&self) -> Option<i64> {
        self.playback.lock().ok().and_then(|p| *p)
    }

    /// Release the playback selection if it points at `device_id`.
    /// Returns true when a release actually happened.
    pub(crate) fn release_playback_if(&self, device_id: i64) -> bool {
        if let Ok(mut playback) = self.playback.lock() {
            if *playback == Some(device_id) {
                *playback = None;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::error::CoreError;
    use crate::registry::Device;
    use crate::settings::PULL_URL_SENTINEL;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Hub double counting start/stop calls.
    pub struct MockHub {
        pub start_calls: AtomicU32,
        pub stop_calls: AtomicU32,
        pub start_result: Mutex<Result<String, String>>,
        pub stop_result: Mutex<Result<(), String>>,
    }

    impl MockHub {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                start_calls: AtomicU32::new(0),
                stop_calls: AtomicU32::new(0),
                start_result: Mutex::new(Ok("http://hub.local/live/dev.m3u8".to_string())),
                stop_result: Mutex::new(Ok(())),
            })
        }

        pub fn stops(&self) -> u32 {
            self.stop_calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl StreamHub for MockHub {
        async fn start_stream(&self, _id: i64, _code: &str) -> Result<String, CoreError> {
            self.start_calls.fetch_add(1, Ordering::Relaxed);
            match self.start_result.lock() {
                Ok(r) => r
                    .clone()
                    .map_err(|m| CoreError::protocol("hub", m)),
                Err(_) => Err(CoreError::protocol("hub", "poisoned")),
            }
        }

        async fn stop_stream(&self, _code: &str) -> Result<(), CoreError> {
            self.stop_calls.fetch_add(1, Ordering::Relaxed);
            match self.stop_result.lock() {
                Ok(r) => r
                    .clone()
                    .map_err(|m| CoreError::protocol("hub", m)),
                Err(_) => Err(CoreError::protocol("hub", "poisoned")),
            }
        }
    }

    /// In-memory registry double.
    pub struct MockRegistry {
        pub devices: Mutex<Vec<Device>>,
        pub put_calls: AtomicU32,
    }

    impl MockRegistry {
        pub fn with_devices(devices: Vec<Device>) -> Arc<Self> {
            Arc::new(Self {
                devices: Mutex::new(devices),
                put_calls: AtomicU32::new(0),
            })
        }

        pub fn pull_url_of(&self, device_id: i64) -> Option<String> {
            self.devices
                .lock()
                .ok()?
                .iter()
                .find(|d| d.id == device_id)
                .map(|d| d.pull_url.clone())
        }
    }

    pub fn test_device(id: i64, pull_url: &str) -> Device {
        Device {
            id,
            device_code: format!("DEV-{:02}", id),
            device_name: format!("Device {}", id),
            province: String::new(),
            city: String::new(),
            location: String::new(),
            push_url: String::new(),
            pull_url: pull_url.to_string(),
            status: true,
            install_time: String::new(),
        }
    }

    #[async_trait]
    impl DeviceRegistry for MockRegistry {
        async fn list_devices(&self) -> Result<Vec<Device>, CoreError> {
            Ok(self
                .devices
                .lock()
                .map_err(|_| CoreError::protocol("registry", "poisoned"))?
                .clone())
        }

        async fn get_device(&self, device_id: i64) -> Result<Device, CoreError> {
            self.list_devices()
                .await?
                .into_iter()
                .find(|d| d.id == device_id)
                .ok_or_else(|| CoreError::precondition("registry", "Unknown device id"))
        }

        async fn set_pull_url(&self, device_id: i64, pull_url: &str) -> Result<(), CoreError> {
            self.put_calls.fetch_add(1, Ordering::Relaxed);
            let mut devices = self
                .devices
                .lock()
                .map_err(|_| CoreError::protocol("registry", "poisoned"))?;
            if let Some(d) = devices.iter_mut().find(|d| d.id == device_id) {
                d.pull_url = pull_url.to_string();
            }
            Ok(())
        }
    }

    /// Prober double that succeeds starting from a given attempt number
    /// (1-based); `u32::MAX` means every probe fails.
    pub struct ScriptedProber {
        pub calls: AtomicU32,
        pub succeed_from: u32,
    }

    impl ScriptedProber {
        pub fn succeeding_from(attempt: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                succeed_from: attempt,
            })
        }

        pub fn always_failing() -> Arc<Self> {
            Self::succeeding_from(u32::MAX)
        }
    }

    #[async_trait]
    impl StreamProber for ScriptedProber {
        async fn probe(&self, _pull_url: &str) -> Result<(), CoreError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if n >= self.succeed_from {
                Ok(())
            } else {
                Err(CoreError::timeout("probe", "no answer"))
            }
        }
    }

    /// Controller wired to the given doubles with millisecond-scale timing.
    pub fn fast_lifecycle(
        hub: Arc<MockHub>,
        registry: Arc<MockRegistry>,
        prober: Arc<dyn StreamProber>,
    ) -> Arc<StreamLifecycle> {
        let settings = AppSettings {
            probe_interval_ms: 5,
            settle_delay_ms: 1,
            sweep_interval_ms: 20,
            ..AppSettings::default()
        };
        StreamLifecycle::new(settings, hub, registry, prober, EventBus::new(64))
    }

    pub fn sentinel_device(id: i64) -> Device {
        test_device(id, PULL_URL_SENTINEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testutil::*;

    #[test]
    fn test_epoch_strictly_increases_and_supersedes() {
        let ctl = fast_lifecycle(
            MockHub::new(),
            MockRegistry::with_devices(vec![]),
            ScriptedProber::always_failing(),
        );

        let (e1, flag1) = ctl.begin_epoch(9);
        let (e2, _flag2) = ctl.begin_epoch(9);
        assert!(e2 > e1);
        // Starting the second epoch cancelled the first task's flag
        assert!(flag1.load(Ordering::Relaxed));
        assert_eq!(ctl.probe_state(9).unwrap().epoch, e2);
    }

    #[test]
    fn test_stale_epoch_commits_are_discarded() {
        let ctl = fast_lifecycle(
            MockHub::new(),
            MockRegistry::with_devices(vec![]),
            ScriptedProber::always_failing(),
        );

        let (old_epoch, _) = ctl.begin_epoch(4);
        let (new_epoch, _) = ctl.begin_epoch(4);

        assert!(!ctl.commit_attempt(4, old_epoch, 3));
        assert!(!ctl.resolve_epoch(4, old_epoch, 8, false));
        // The current epoch's entry is untouched
        let state = ctl.probe_state(4).unwrap();
        assert_eq!(state.epoch, new_epoch);
        assert_eq!(state.attempts, 0);
        assert_eq!(state.available, None);
        assert!(ctl.commit_attempt(4, new_epoch, 1));
    }

    #[test]
    fn test_resolve_epoch_clears_state_and_sets_availability() {
        let ctl = fast_lifecycle(
            MockHub::new(),
            MockRegistry::with_devices(vec![]),
            ScriptedProber::always_failing(),
        );

        let (epoch, _) = ctl.begin_epoch(2);
        assert!(ctl.resolve_epoch(2, epoch, 3, true));
        assert!(ctl.probe_state(2).is_none());
        assert_eq!(ctl.availability(2), Some(true));
    }

    #[test]
    fn test_playback_release_only_for_selected_device() {
        let ctl = fast_lifecycle(
            MockHub::new(),
            MockRegistry::with_devices(vec![]),
            ScriptedProber::always_failing(),
        );

        ctl.select_playback(5);
        assert!(!ctl.release_playback_if(6));
        assert_eq!(ctl.playback_device(), Some(5));
        assert!(ctl.release_playback_if(5));
        assert_eq!(ctl.playback_device(), None);
    }
}
