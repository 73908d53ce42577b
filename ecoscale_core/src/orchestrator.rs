//! Host analysis state machine.
//!
//! ```text
//! Ready -> Analyzing -> WaitingForWeight -> Calculating -> Complete
//!   ^          |               |                             |
//!   +-- fail --+--- removal ---+---------- removal ----------+
//! ```
//!
//! Classification runs on its own thread and reports back through a channel drained
//! by [`Orchestrator::poll_classification`]; nothing here ever blocks. Each request
//! gets a session id, so a completion that arrives after its session was replaced
//! or reset is discarded. Only one classifier call is ever outstanding.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel as xch;
use tracing::{debug, info, warn};

use crate::collab::{CarbonCalculator, Classifier, Detection, Frame, FrameSource, confidence_pct};
use crate::config::HostCfg;
use crate::error::RequestError;
use crate::protocol::{AnalysisResult, SensorMode};
use crate::session::{AnalysisSession, AnalysisStatus};
use crate::transport::{ResultSink, WeightRecord};

/// Something the UI shell should tell the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Connected { port: String },
    ConnectionFailed { reason: String },
    ConnectionLost,
    Disconnected,
    DeviceStatus { mode: SensorMode, grams: f64 },
    AnalysisStarted { session: u64, auto: bool },
    /// An automatic trigger could not start.
    AutoTriggerFailed { reason: String },
    Classified { session: u64, food_name: String, confidence_pct: f64 },
    ClassificationFailed { session: u64, reason: String },
    ResultSent { session: u64, result: AnalysisResult },
    /// The session is complete on the host but the device never got the result.
    ResultSendFailed { session: u64, reason: String },
    SessionCancelled { session: u64 },
    SessionReset { session: u64 },
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::Connected { port } => write!(f, "Connected to scale on {port}"),
            HostEvent::ConnectionFailed { reason } => write!(f, "Connection failed: {reason}"),
            HostEvent::ConnectionLost => f.write_str("Connection to scale lost"),
            HostEvent::Disconnected => f.write_str("Disconnected"),
            HostEvent::DeviceStatus { mode, grams } => {
                write!(f, "Scale ready ({} sensor, {grams:.1} g)", mode.as_str().to_lowercase())
            }
            HostEvent::AnalysisStarted { session, auto } => {
                let how = if *auto { "automatic" } else { "manual" };
                write!(f, "Analyzing food (#{session}, {how})")
            }
            HostEvent::AutoTriggerFailed { reason } => {
                write!(f, "Could not start analysis: {reason}")
            }
            HostEvent::Classified {
                food_name,
                confidence_pct,
                ..
            } => write!(f, "Detected {food_name} ({confidence_pct:.1}% confidence)"),
            HostEvent::ClassificationFailed { reason, .. } => {
                write!(f, "Analysis failed: {reason}")
            }
            HostEvent::ResultSent { result, .. } => write!(
                f,
                "{}: {:.1} g, {:.1} g CO2e ({})",
                result.food_name, result.weight_grams, result.co2_grams, result.impact_level
            ),
            HostEvent::ResultSendFailed { reason, .. } => {
                write!(f, "Result computed but not delivered to scale: {reason}")
            }
            HostEvent::SessionCancelled { .. } => f.write_str("Item removed; ready for next item"),
            HostEvent::SessionReset { .. } => f.write_str("Reset; ready for next item"),
        }
    }
}

struct Completion {
    session: u64,
    outcome: Result<Detection, String>,
}

pub struct Orchestrator<K: CarbonCalculator> {
    cfg: HostCfg,
    classifier: Arc<dyn Classifier>,
    calculator: K,
    session: Option<AnalysisSession>,
    next_id: u64,
    in_flight: Option<u64>,
    /// Latest stable weight seen while the classifier was busy.
    pending_weight: Option<f64>,
    /// Auto-trigger fires once per placement; re-armed by a removal or reset.
    auto_armed: bool,
    done_tx: xch::Sender<Completion>,
    done_rx: xch::Receiver<Completion>,
    events: Vec<HostEvent>,
}

impl<K: CarbonCalculator> fmt::Debug for Orchestrator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session", &self.session)
            .field("in_flight", &self.in_flight)
            .field("pending_weight", &self.pending_weight)
            .finish_non_exhaustive()
    }
}

impl<K: CarbonCalculator> Orchestrator<K> {
    pub fn new(cfg: HostCfg, classifier: Arc<dyn Classifier>, calculator: K) -> Self {
        let (done_tx, done_rx) = xch::unbounded();
        Self {
            cfg,
            classifier,
            calculator,
            session: None,
            next_id: 1,
            in_flight: None,
            pending_weight: None,
            auto_armed: true,
            done_tx,
            done_rx,
            events: Vec::new(),
        }
    }

    pub fn status(&self) -> AnalysisStatus {
        self.session
            .as_ref()
            .map_or(AnalysisStatus::Ready, |s| s.status)
    }

    pub fn session(&self) -> Option<&AnalysisSession> {
        self.session.as_ref()
    }

    /// True while a classifier call has not returned yet.
    pub fn classification_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn config(&self) -> &HostCfg {
        &self.cfg
    }

    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }

    /// Manual classification request with the current camera frame.
    ///
    /// Refused with [`RequestError::Busy`] while a session is analyzing, waiting or
    /// calculating; a completed session is replaced.
    pub fn request(&mut self, frames: &mut dyn FrameSource) -> Result<u64, RequestError> {
        if self.status().is_busy() || self.in_flight.is_some() {
            debug!(status = %self.status(), "classification request refused: busy");
            return Err(RequestError::Busy);
        }
        let frame = frames.current_frame().ok_or(RequestError::NoFrame)?;
        Ok(self.start(frame, None, false))
    }

    fn start(&mut self, frame: Frame, weight: Option<f64>, auto: bool) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(old) = self.session.replace(AnalysisSession::start(id, Instant::now())) {
            debug!(replaced = old.id, "previous session replaced");
        }
        self.pending_weight = weight;
        self.in_flight = Some(id);

        let frame_bytes = frame.len();
        let classifier = Arc::clone(&self.classifier);
        let tx = self.done_tx.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("ecoscale-classify-{id}"))
            .spawn(move || {
                let outcome = classifier.classify(&frame).map_err(|e| e.to_string());
                // The orchestrator may be gone already; nothing left to report to.
                let _ = tx.send(Completion {
                    session: id,
                    outcome,
                });
            });

        match spawned {
            Ok(_detached) => {
                info!(session = id, auto, frame_bytes, "analysis started");
                self.events.push(HostEvent::AnalysisStarted { session: id, auto });
            }
            Err(e) => {
                warn!(session = id, error = %e, "could not start classifier thread");
                self.in_flight = None;
                if let Some(s) = self.session.as_mut() {
                    s.status = AnalysisStatus::Ready;
                }
                self.events.push(HostEvent::ClassificationFailed {
                    session: id,
                    reason: e.to_string(),
                });
            }
        }
        id
    }

    /// Apply classifier completions that arrived since the last call.
    pub fn poll_classification(&mut self, sink: &mut dyn ResultSink) {
        let completions: Vec<Completion> = self.done_rx.try_iter().collect();
        for done in completions {
            if self.in_flight == Some(done.session) {
                self.in_flight = None;
            }
            let current = self
                .session
                .as_ref()
                .is_some_and(|s| s.id == done.session && s.status == AnalysisStatus::Analyzing);
            if !current {
                debug!(session = done.session, "stale classification discarded");
                continue;
            }
            self.on_classified(done.session, done.outcome, sink);
        }
    }

    fn on_classified(&mut self, id: u64, outcome: Result<Detection, String>, sink: &mut dyn ResultSink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match outcome {
            Ok(detection) => {
                let pct = confidence_pct(detection.confidence);
                info!(
                    session = id,
                    food = %detection.food_name,
                    confidence_pct = pct,
                    elapsed_ms = u64::try_from(detection.elapsed.as_millis()).unwrap_or(u64::MAX),
                    "food classified"
                );
                self.events.push(HostEvent::Classified {
                    session: id,
                    food_name: detection.food_name.clone(),
                    confidence_pct: pct,
                });
                session.detection = Some(detection);
                session.status = AnalysisStatus::WaitingForWeight;
                if let Some(w) = self.pending_weight.take() {
                    self.calculate(w, sink);
                }
            }
            Err(reason) => {
                warn!(session = id, %reason, "classification failed");
                session.status = AnalysisStatus::Ready;
                self.pending_weight = None;
                self.events
                    .push(HostEvent::ClassificationFailed { session: id, reason });
            }
        }
    }

    /// Feed one weight record from the device.
    pub fn on_weight(
        &mut self,
        record: &WeightRecord,
        frames: &mut dyn FrameSource,
        sink: &mut dyn ResultSink,
    ) {
        let removed = record.grams < self.cfg.removal_floor_g;
        if removed {
            self.auto_armed = true;
        }

        match self.status() {
            AnalysisStatus::Ready => {
                if record.stable
                    && record.grams > self.cfg.auto_trigger_g
                    && self.auto_armed
                    && self.in_flight.is_none()
                {
                    self.auto_trigger(record.grams, frames);
                }
            }
            AnalysisStatus::Analyzing => {
                if removed {
                    self.pending_weight = None;
                } else if record.stable {
                    self.pending_weight = Some(record.grams);
                }
            }
            AnalysisStatus::WaitingForWeight => {
                if removed {
                    self.cancel();
                } else if record.stable {
                    self.calculate(record.grams, sink);
                }
            }
            AnalysisStatus::Complete => {
                if removed {
                    self.cancel();
                }
            }
            AnalysisStatus::Calculating => {}
        }
    }

    fn auto_trigger(&mut self, grams: f64, frames: &mut dyn FrameSource) {
        self.auto_armed = false;
        match frames.current_frame() {
            Some(frame) => {
                debug!(grams, "stable load above threshold; auto-triggering");
                self.start(frame, Some(grams), true);
            }
            None => {
                warn!(grams, "auto-trigger skipped: no camera frame");
                self.events.push(HostEvent::AutoTriggerFailed {
                    reason: RequestError::NoFrame.to_string(),
                });
            }
        }
    }

    fn calculate(&mut self, grams: f64, sink: &mut dyn ResultSink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(detection) = session.detection.as_ref() else {
            return;
        };
        session.status = AnalysisStatus::Calculating;
        let emission = self.calculator.compute(&detection.food_name, grams);
        let result = AnalysisResult {
            food_name: detection.food_name.clone(),
            confidence_pct: confidence_pct(detection.confidence),
            weight_grams: grams,
            co2_grams: emission.co2_grams,
            impact_level: emission.impact_level,
        };
        session.weight_grams = Some(grams);
        session.emission = Some(emission);
        session.result = Some(result.clone());
        session.status = AnalysisStatus::Complete;
        let id = session.id;
        info!(
            session = id,
            food = %result.food_name,
            grams,
            co2_g = result.co2_grams,
            impact = %result.impact_level,
            "analysis complete"
        );

        match sink.send_result(&result) {
            Ok(()) => self.events.push(HostEvent::ResultSent { session: id, result }),
            Err(e) => {
                warn!(session = id, error = %e, "result not delivered");
                self.events.push(HostEvent::ResultSendFailed {
                    session: id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn cancel(&mut self) {
        self.pending_weight = None;
        if let Some(old) = self.session.take() {
            info!(session = old.id, status = %old.status, "item removed; session cancelled");
            self.events
                .push(HostEvent::SessionCancelled { session: old.id });
        }
    }

    /// Drop the current session and return to `Ready`. An outstanding classifier
    /// call still blocks new requests until it returns; its answer is discarded.
    pub fn reset(&mut self) {
        self.pending_weight = None;
        self.auto_armed = true;
        if let Some(old) = self.session.take() {
            info!(session = old.id, "session reset");
            self.events.push(HostEvent::SessionReset { session: old.id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_text_is_human_readable() {
        let e = HostEvent::Classified {
            session: 1,
            food_name: "apple".into(),
            confidence_pct: 95.5,
        };
        assert_eq!(e.to_string(), "Detected apple (95.5% confidence)");
        assert_eq!(
            HostEvent::DeviceStatus {
                mode: SensorMode::Simulation,
                grams: 0.0
            }
            .to_string(),
            "Scale ready (simulation sensor, 0.0 g)"
        );
    }
}
