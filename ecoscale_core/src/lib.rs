#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core logic for the scale and its host (hardware-agnostic).
//!
//! All hardware goes through the `ecoscale_traits` seams: `Scale` for the
//! transducer, `PortOpener` for the host's serial link, `LineIo` for the device's,
//! and `Clock` for every delay.
//!
//! ## Architecture
//!
//! - **Protocol**: colon-delimited text lines, pure encode/decode (`protocol`)
//! - **Stabilizer**: burst sampling, outlier rejection and hysteresis, tare, and a
//!   synthetic fallback when the transducer is gone (`stabilizer`, `synthetic`)
//! - **Transport**: host link with a background reader thread feeding a queue
//!   (`transport`)
//! - **Orchestrator**: host analysis state machine, single-flight classification
//!   (`orchestrator`, `session`, `host`)
//! - **Device**: display state machine and the cooperative tick loop (`display`,
//!   `device`)

pub mod collab;
pub mod config;
pub mod conversions;
pub mod device;
pub mod display;
pub mod error;
pub mod host;
pub mod hw_error;
pub mod mocks;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod stabilizer;
pub mod synthetic;
pub mod transport;
pub mod util;

pub use collab::{CarbonCalculator, Classifier, Detection, Emission, Frame, FrameSource};
pub use config::{DeviceCfg, DeviceSignature, HostCfg, LinkSettings, StabilizerCfg};
pub use device::{DeviceLoop, ReportPolicy};
pub use display::{DisplayController, DisplayMode, Screen};
pub use error::{EngineError, RequestError, SensorError, TransportError};
pub use host::HostController;
pub use orchestrator::{HostEvent, Orchestrator};
pub use protocol::{AnalysisResult, ImpactLevel, ProtocolMessage, SensorMode};
pub use session::{AnalysisSession, AnalysisStatus};
pub use stabilizer::{CalibrationState, Stabilizer, WeightReading};
pub use transport::{ConnectionStatus, Inbound, LinkStats, ResultSink, Transport, WeightRecord};
