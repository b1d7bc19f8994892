// gridwatch: stream and telemetry lifecycle coordination for a substation
// device-monitoring dashboard. The dashboard shell consumes this crate
// through `StreamLifecycle`, `TelemetrySession` and the event bus.

#[macro_use]
pub mod logging;

pub mod error;
pub mod events;
pub mod hub;
pub mod registry;
pub mod settings;
pub mod stream;
pub mod telemetry;

pub use error::{CoreError, ErrorKind};
pub use events::{Event, EventBus};
pub use hub::{HttpStreamHub, StreamHub};
pub use registry::{Device, DeviceRegistry, HttpDeviceRegistry};
pub use settings::{load_settings, AppSettings, PULL_URL_SENTINEL};
pub use stream::probe::{HttpStreamProber, StreamProber};
pub use stream::{ProbeState, StreamLifecycle};
pub use telemetry::session::{ConnectionState, SessionSnapshot, TelemetrySession};
pub use telemetry::transport::{BridgeTransport, WsBridgeTransport};
pub use telemetry::SensorKind;
