//! Device display state machine.
//!
//! `Live` renders every reading. An `AI_RESULT` from the host freezes the screen on
//! the result, unconditionally, and readings stop being rendered. The device returns
//! to `Live` on its own when a reading drops below the removal floor; the host never
//! has to say so.

use tracing::{debug, info};

use crate::protocol::{AnalysisResult, ProtocolMessage};
use crate::stabilizer::WeightReading;

/// Whatever physically shows things on the device.
pub trait Screen {
    fn show_weight(&mut self, reading: &WeightReading);
    fn show_result(&mut self, result: &AnalysisResult);
}

impl<S: Screen + ?Sized> Screen for Box<S> {
    fn show_weight(&mut self, reading: &WeightReading) {
        (**self).show_weight(reading);
    }

    fn show_result(&mut self, result: &AnalysisResult) {
        (**self).show_result(result);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Live,
    ResultFrozen,
}

#[derive(Debug)]
pub struct DisplayController<S: Screen> {
    screen: S,
    mode: DisplayMode,
    removal_floor_g: f64,
    shown: Option<AnalysisResult>,
}

impl<S: Screen> DisplayController<S> {
    pub fn new(screen: S, removal_floor_g: f64) -> Self {
        Self {
            screen,
            mode: DisplayMode::Live,
            removal_floor_g,
            shown: None,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// The result currently frozen on screen.
    pub fn shown_result(&self) -> Option<&AnalysisResult> {
        self.shown.as_ref()
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    pub fn on_message(&mut self, msg: &ProtocolMessage) {
        match msg {
            ProtocolMessage::AnalysisResult(result) => {
                info!(food = %result.food_name, co2_g = result.co2_grams, "showing analysis result");
                self.screen.show_result(result);
                self.shown = Some(result.clone());
                self.mode = DisplayMode::ResultFrozen;
            }
            other => debug!(kind = other.kind(), "message ignored by display"),
        }
    }

    pub fn on_reading(&mut self, reading: &WeightReading) {
        match self.mode {
            DisplayMode::Live => self.screen.show_weight(reading),
            DisplayMode::ResultFrozen if reading.weight_grams < self.removal_floor_g => {
                debug!(grams = reading.weight_grams, "item removed; back to live weight");
                self.mode = DisplayMode::Live;
                self.shown = None;
                self.screen.show_weight(reading);
            }
            DisplayMode::ResultFrozen => {}
        }
    }
}
