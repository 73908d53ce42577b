//! Host controller: the surface a UI shell drives.
//!
//! Owns the transport, the orchestrator and the frame source. The shell calls
//! [`HostController::poll`] on its own cadence and renders the returned events; every
//! call returns promptly because the only blocking work (link reads, classifier
//! calls) happens on background threads.

use std::sync::Arc;

use ecoscale_traits::PortOpener;
use tracing::{debug, info};

use crate::collab::{CarbonCalculator, Classifier, FrameSource};
use crate::config::{HostCfg, LinkSettings};
use crate::error::{RequestError, TransportError};
use crate::orchestrator::{HostEvent, Orchestrator};
use crate::protocol::{ProtocolMessage, SensorMode};
use crate::session::{AnalysisSession, AnalysisStatus};
use crate::transport::{ConnectionStatus, Inbound, LinkStats, Transport, WeightRecord};

pub struct HostController<O: PortOpener, K: CarbonCalculator, F: FrameSource> {
    transport: Transport<O>,
    orchestrator: Orchestrator<K>,
    frames: F,
    last_reading: Option<WeightRecord>,
    device_mode: Option<SensorMode>,
    seen_status: ConnectionStatus,
    events: Vec<HostEvent>,
}

impl<O, K, F> HostController<O, K, F>
where
    O: PortOpener,
    K: CarbonCalculator,
    F: FrameSource,
{
    pub fn new(
        opener: O,
        link: LinkSettings,
        cfg: HostCfg,
        classifier: Arc<dyn Classifier>,
        calculator: K,
        frames: F,
    ) -> Self {
        Self {
            transport: Transport::new(opener, link),
            orchestrator: Orchestrator::new(cfg, classifier, calculator),
            frames,
            last_reading: None,
            device_mode: None,
            seen_status: ConnectionStatus::Disconnected,
            events: Vec::new(),
        }
    }

    /// Connect to `port`, or probe for the device when `None`. Failures are also
    /// reported as a [`HostEvent::ConnectionFailed`].
    pub fn connect(&mut self, port: Option<&str>) -> Result<String, TransportError> {
        match self.transport.connect(port) {
            Ok(name) => {
                self.seen_status = ConnectionStatus::Connected;
                self.events.push(HostEvent::Connected { port: name.clone() });
                Ok(name)
            }
            Err(e) => {
                self.seen_status = ConnectionStatus::Disconnected;
                self.events.push(HostEvent::ConnectionFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn disconnect(&mut self) {
        let was_up = self.transport.status() != ConnectionStatus::Disconnected;
        self.transport.disconnect();
        self.seen_status = ConnectionStatus::Disconnected;
        if was_up {
            self.events.push(HostEvent::Disconnected);
        }
    }

    /// Drain the link, advance the state machine and return what happened.
    pub fn poll(&mut self) -> Vec<HostEvent> {
        let status = self.transport.status();
        if status == ConnectionStatus::Lost && self.seen_status != ConnectionStatus::Lost {
            info!(port = self.transport.port().unwrap_or("?"), "link lost");
            self.events.push(HostEvent::ConnectionLost);
        }
        self.seen_status = status;

        while let Some(item) = self.transport.read_next() {
            match item {
                Inbound::Weight(record) => {
                    self.last_reading = Some(record);
                    self.orchestrator
                        .on_weight(&record, &mut self.frames, &mut self.transport);
                }
                Inbound::Message(ProtocolMessage::Status { mode, grams }) => {
                    if self.device_mode != Some(mode) {
                        info!(mode = mode.as_str(), "device sensor mode");
                    }
                    self.device_mode = Some(mode);
                    self.events.push(HostEvent::DeviceStatus { mode, grams });
                }
                Inbound::Message(other) => {
                    debug!(kind = other.kind(), "inbound message needs no action");
                }
            }
        }

        self.orchestrator.poll_classification(&mut self.transport);
        self.events.extend(self.orchestrator.drain_events());
        std::mem::take(&mut self.events)
    }

    pub fn request_classification(&mut self) -> Result<u64, RequestError> {
        let id = self.orchestrator.request(&mut self.frames)?;
        self.events.extend(self.orchestrator.drain_events());
        Ok(id)
    }

    pub fn reset(&mut self) {
        self.orchestrator.reset();
        self.events.extend(self.orchestrator.drain_events());
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    pub fn port(&self) -> Option<&str> {
        self.transport.port()
    }

    pub fn last_reading(&self) -> Option<WeightRecord> {
        self.last_reading
    }

    pub fn session(&self) -> Option<&AnalysisSession> {
        self.orchestrator.session()
    }

    pub fn status(&self) -> AnalysisStatus {
        self.orchestrator.status()
    }

    /// Sensor mode last announced by the device, if any.
    pub fn device_mode(&self) -> Option<SensorMode> {
        self.device_mode
    }

    pub fn link_stats(&self) -> LinkStats {
        self.transport.stats()
    }

    pub fn host_config(&self) -> &HostCfg {
        self.orchestrator.config()
    }
}
