//! Host-side analysis session record.

use std::fmt;
use std::time::Instant;

use crate::collab::{Detection, Emission};
use crate::protocol::AnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Ready,
    Analyzing,
    WaitingForWeight,
    Calculating,
    Complete,
}

impl AnalysisStatus {
    /// Statuses during which a new classification request is refused.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            AnalysisStatus::Analyzing | AnalysisStatus::WaitingForWeight | AnalysisStatus::Calculating
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Ready => "ready",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::WaitingForWeight => "waiting for weight",
            AnalysisStatus::Calculating => "calculating",
            AnalysisStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single in-flight (or last completed) analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSession {
    pub id: u64,
    pub status: AnalysisStatus,
    pub started_at: Instant,
    /// Filled once the classifier answers.
    pub detection: Option<Detection>,
    /// Weight the footprint was (or will be) computed for.
    pub weight_grams: Option<f64>,
    pub emission: Option<Emission>,
    /// Exactly what was sent to the device.
    pub result: Option<AnalysisResult>,
}

impl AnalysisSession {
    pub(crate) fn start(id: u64, now: Instant) -> Self {
        Self {
            id,
            status: AnalysisStatus::Analyzing,
            started_at: now,
            detection: None,
            weight_grams: None,
            emission: None,
            result: None,
        }
    }
}
