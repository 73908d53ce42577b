//! In-memory stand-ins for hardware and collaborators.
//!
//! Used by the test suites and the simulator; none of these touch real devices.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crossbeam_channel as xch;
use ecoscale_traits::{BoxError, LineIo, LinkHalves, PortInfo, PortOpener, Scale};

use crate::collab::{CarbonCalculator, Classifier, Detection, Emission, Frame, FrameSource};
use crate::display::Screen;
use crate::error::TransportError;
use crate::protocol::{AnalysisResult, ImpactLevel};
use crate::stabilizer::WeightReading;
use crate::transport::ResultSink;

fn poisoned() -> io::Error {
    io::Error::other("mock lock poisoned")
}

#[derive(Debug, Clone)]
enum Step {
    Raw(i32),
    Fail(String),
}

/// Scale that replays a script of raw counts and failures.
///
/// Once the script runs dry it repeats the last raw value it returned (or fails if
/// it never returned one). Clones share the script, so a test can keep one to push
/// more steps after handing the other to an engine.
#[derive(Debug, Clone, Default)]
pub struct ScriptedScale {
    script: Arc<Mutex<VecDeque<Step>>>,
    last_raw: Arc<Mutex<Option<i32>>>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedScale {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raws(raws: impl IntoIterator<Item = i32>) -> Self {
        let s = Self::new();
        s.push_raws(raws);
        s
    }

    pub fn push_raws(&self, raws: impl IntoIterator<Item = i32>) {
        if let Ok(mut q) = self.script.lock() {
            q.extend(raws.into_iter().map(Step::Raw));
        }
    }

    /// Queue raw counts that convert to `grams` under `scale_factor` with zero offset.
    #[allow(clippy::cast_possible_truncation)]
    pub fn push_grams(&self, grams: &[f64], scale_factor: f64) {
        self.push_raws(grams.iter().map(|g| (g * scale_factor).round() as i32));
    }

    /// Queue one failed read. Messages containing "unavailable" are treated as a
    /// lost transducer; anything else as a transient glitch.
    pub fn push_failure(&self, message: &str) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Step::Fail(message.to_string()));
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl Scale for ScriptedScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let step = self.script.lock().map_err(|_| poisoned())?.pop_front();
        let mut last = self.last_raw.lock().map_err(|_| poisoned())?;
        match step {
            Some(Step::Raw(v)) => {
                *last = Some(v);
                Ok(v)
            }
            Some(Step::Fail(msg)) => Err(io::Error::other(msg).into()),
            None => (*last).ok_or_else(|| io::Error::other("script exhausted").into()),
        }
    }
}

/// Scale whose every read fails with "transducer unavailable".
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadScale;

impl Scale for DeadScale {
    fn read(&mut self, _timeout: Duration) -> Result<i32, BoxError> {
        Err(io::Error::other("transducer unavailable").into())
    }
}

#[derive(Debug, Default)]
struct PipeState {
    bytes: VecDeque<u8>,
    broken: bool,
}

/// One direction of an in-memory byte link.
#[derive(Debug, Clone, Default)]
struct Pipe {
    inner: Arc<(Mutex<PipeState>, Condvar)>,
}

impl Pipe {
    fn push(&self, data: &[u8]) -> io::Result<()> {
        let (lock, cv) = &*self.inner;
        let mut st = lock.lock().map_err(|_| poisoned())?;
        if st.broken {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        st.bytes.extend(data.iter().copied());
        cv.notify_all();
        Ok(())
    }

    fn set_broken(&self, broken: bool) {
        let (lock, cv) = &*self.inner;
        if let Ok(mut st) = lock.lock() {
            st.broken = broken;
            cv.notify_all();
        }
    }

    fn drain(&self) -> Vec<u8> {
        let (lock, _) = &*self.inner;
        lock.lock()
            .map(|mut st| st.bytes.drain(..).collect())
            .unwrap_or_default()
    }
}

struct PipeReader {
    pipe: Pipe,
    timeout: Duration,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (lock, cv) = &*self.pipe.inner;
        let guard = lock.lock().map_err(|_| poisoned())?;
        let (mut st, _) = cv
            .wait_timeout_while(guard, self.timeout, |st| st.bytes.is_empty() && !st.broken)
            .map_err(|_| poisoned())?;
        if st.broken {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if st.bytes.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(st.bytes.len());
        for (slot, b) in buf.iter_mut().zip(st.bytes.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

struct PipeWriter {
    pipe: Pipe,
    fail_writes: Arc<AtomicBool>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(io::Error::other("injected write failure"));
        }
        self.pipe.push(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Host end of an in-memory link: enumerates a single fake port and opens it.
#[derive(Debug, Clone)]
pub struct LoopbackOpener {
    port: PortInfo,
    to_device: Pipe,
    to_host: Pipe,
    fail_open: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl LoopbackOpener {
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl PortOpener for LoopbackOpener {
    fn available(&self) -> Result<Vec<PortInfo>, BoxError> {
        Ok(vec![self.port.clone()])
    }

    fn open(&self, name: &str, _baud: u32, read_timeout: Duration) -> Result<LinkHalves, BoxError> {
        if self.fail_open.load(Ordering::Relaxed) || name != self.port.name {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("no such port: {name}")).into());
        }
        self.opens.fetch_add(1, Ordering::Relaxed);
        self.to_host.set_broken(false);
        Ok(LinkHalves {
            reader: Box::new(PipeReader {
                pipe: self.to_host.clone(),
                timeout: read_timeout,
            }),
            writer: Box::new(PipeWriter {
                pipe: self.to_device.clone(),
                fail_writes: self.fail_writes.clone(),
            }),
        })
    }
}

/// Device end of an in-memory link.
#[derive(Debug, Clone)]
pub struct LoopbackDevice {
    to_device: Pipe,
    to_host: Pipe,
    pending: Vec<u8>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl LoopbackDevice {
    /// Write raw bytes toward the host, terminators and all.
    pub fn write_raw(&self, bytes: &[u8]) {
        let _ = self.to_host.push(bytes);
    }

    /// Make the host's next read fail hard, as if the cable was pulled.
    pub fn break_link(&self) {
        self.to_host.set_broken(true);
    }

    /// Every line this end has sent, in order.
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl LineIo for LoopbackDevice {
    fn poll_line(&mut self) -> Option<String> {
        self.pending.extend(self.to_device.drain());
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line[..pos]).into_owned())
    }

    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        self.to_host.push(format!("{line}\n").as_bytes())?;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(line.to_string());
        }
        Ok(())
    }
}

/// A connected pair of link ends. The host side advertises one port named `name`
/// with the default device USB vendor id.
pub fn loopback(name: &str) -> (LoopbackOpener, LoopbackDevice) {
    let to_device = Pipe::default();
    let to_host = Pipe::default();
    let opener = LoopbackOpener {
        port: PortInfo {
            name: name.to_string(),
            description: Some("Loopback Pico".into()),
            usb_vid: Some(0x2e8a),
            usb_pid: Some(0x0005),
        },
        to_device: to_device.clone(),
        to_host: to_host.clone(),
        fail_open: Arc::new(AtomicBool::new(false)),
        fail_writes: Arc::new(AtomicBool::new(false)),
        opens: Arc::new(AtomicUsize::new(0)),
    };
    let device = LoopbackDevice {
        to_device,
        to_host,
        pending: Vec::new(),
        sent: Arc::new(Mutex::new(Vec::new())),
    };
    (opener, device)
}

/// What a [`RecordingScreen`] was asked to draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Drawn {
    Weight(WeightReading),
    Result(AnalysisResult),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingScreen {
    pub drawn: Vec<Drawn>,
}

impl RecordingScreen {
    pub fn last(&self) -> Option<&Drawn> {
        self.drawn.last()
    }
}

impl Screen for RecordingScreen {
    fn show_weight(&mut self, reading: &WeightReading) {
        self.drawn.push(Drawn::Weight(*reading));
    }

    fn show_result(&mut self, result: &AnalysisResult) {
        self.drawn.push(Drawn::Result(result.clone()));
    }
}

/// Classifier returning a fixed answer. A gated instance blocks each call until
/// the test releases it through the returned sender.
#[derive(Debug)]
pub struct FixedClassifier {
    answer: Result<Detection, String>,
    gate: Option<xch::Receiver<()>>,
    calls: Arc<AtomicUsize>,
}

impl FixedClassifier {
    pub fn new(food_name: &str, confidence: f64) -> Self {
        Self {
            answer: Ok(Detection {
                food_name: food_name.to_string(),
                confidence,
                elapsed: Duration::from_millis(5),
            }),
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gated(mut self) -> (Self, xch::Sender<()>) {
        let (tx, rx) = xch::unbounded();
        self.gate = Some(rx);
        (self, tx)
    }

    /// Shared call counter; stays valid after the classifier is moved.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _frame: &Frame) -> Result<Detection, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.recv_timeout(Duration::from_secs(10))
                .map_err(|_| io::Error::other("classifier gate never opened"))?;
        }
        self.answer.clone().map_err(|r| io::Error::other(r).into())
    }
}

/// Calculator with one emission factor for every food, in g CO2e per gram.
#[derive(Debug, Clone)]
pub struct FlatCalculator {
    factor: f64,
    calls: Arc<AtomicUsize>,
}

impl FlatCalculator {
    pub fn new(factor: f64) -> Self {
        Self {
            factor,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl CarbonCalculator for FlatCalculator {
    fn compute(&self, _food_name: &str, weight_grams: f64) -> Emission {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let co2_grams = weight_grams * self.factor;
        Emission {
            co2_grams,
            impact_level: ImpactLevel::from_co2_grams(co2_grams),
        }
    }
}

/// Frame source that always (or never) has a frame.
#[derive(Debug, Clone, Default)]
pub struct StaticFrames(pub Option<Frame>);

impl StaticFrames {
    pub fn blank() -> Self {
        Self(Some(Frame::new(vec![0u8; 16])))
    }
}

impl FrameSource for StaticFrames {
    fn current_frame(&mut self) -> Option<Frame> {
        self.0.clone()
    }
}

/// Result sink that records what it was given.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub sent: Vec<AnalysisResult>,
    pub fail: bool,
}

impl ResultSink for RecordingSink {
    fn send_result(&mut self, result: &AnalysisResult) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::NotConnected);
        }
        self.sent.push(result.clone());
        Ok(())
    }
}
