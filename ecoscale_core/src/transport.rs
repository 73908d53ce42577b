//! Host-side serial transport.
//!
//! One background reader thread owns the read half of the link: it accumulates bytes
//! into lines, decodes them and pushes the results onto an unbounded FIFO. The caller
//! only ever pops that FIFO (`read_next`, never blocks) and writes through the write
//! half (`send`). The queue is the single point of cross-thread contact.
//!
//! The reader exits when `disconnect` raises the shutdown flag (within one read
//! timeout) or when the link reports a hard I/O error, in which case the connection
//! status turns to [`ConnectionStatus::Lost`] and the caller may `connect` again.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use ecoscale_traits::PortOpener;
use tracing::{debug, info, trace, warn};

use crate::config::LinkSettings;
use crate::error::TransportError;
use crate::protocol::{AnalysisResult, ProtocolMessage, decode, encode_line};

/// Back-off after a zero-length read so a closed stream does not spin.
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// Weight data extracted from a decoded `WEIGHT` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightRecord {
    pub grams: f64,
    pub stable: bool,
    /// Milliseconds since the transport was created.
    pub received_ms: u64,
}

/// One item on the inbound queue. Every decoded `WEIGHT` line yields a
/// `Message` followed by a `Weight`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ProtocolMessage),
    Weight(WeightRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    /// The reader hit a hard I/O error; the link is down until the next `connect`.
    Lost,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Lost => "connection lost",
        }
    }
}

#[derive(Debug, Default)]
struct LinkCounters {
    lines: AtomicU64,
    weights: AtomicU64,
    dropped: AtomicU64,
}

/// Counters accumulated across every connection of one transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub lines_received: u64,
    pub weight_records: u64,
    /// Unrecognized or overlong lines.
    pub lines_dropped: u64,
}

/// Anything that can carry an analysis result back to the device.
pub trait ResultSink {
    fn send_result(&mut self, result: &AnalysisResult) -> Result<(), TransportError>;
}

/// Result of feeding one byte to a [`LineAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Line(String),
    /// A line exceeded the cap and was discarded up to its terminator.
    Overflow,
}

/// Splits a byte stream on `\n`, discarding partial lines longer than `max_len`.
#[derive(Debug)]
pub struct LineAssembler {
    pending: Vec<u8>,
    max_len: usize,
    overflowed: bool,
}

impl LineAssembler {
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: Vec::with_capacity(128),
            max_len,
            overflowed: false,
        }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Assembled> {
        if byte == b'\n' {
            if std::mem::take(&mut self.overflowed) {
                return Some(Assembled::Overflow);
            }
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            return Some(Assembled::Line(line));
        }
        if self.overflowed {
            return None;
        }
        if self.pending.len() >= self.max_len {
            self.pending.clear();
            self.overflowed = true;
            return None;
        }
        self.pending.push(byte);
        None
    }
}

struct ReaderCtx {
    tx: xch::Sender<Inbound>,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    counters: Arc<LinkCounters>,
    max_line_len: usize,
    epoch: Instant,
}

impl ReaderCtx {
    fn run(self, mut reader: Box<dyn Read + Send>) {
        let mut buf = [0u8; 256];
        let mut lines = LineAssembler::new(self.max_line_len);
        'outer: while !self.shutdown.load(Ordering::Relaxed) {
            let n = match reader.read(&mut buf) {
                Ok(0) => {
                    std::thread::sleep(IDLE_BACKOFF);
                    continue;
                }
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "link read failed; reader stopping");
                    self.alive.store(false, Ordering::Relaxed);
                    break;
                }
            };
            for &b in &buf[..n] {
                match lines.feed(b) {
                    None => {}
                    Some(Assembled::Overflow) => {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(max = self.max_line_len, "overlong line discarded");
                    }
                    Some(Assembled::Line(line)) => {
                        if !self.dispatch(&line) {
                            break 'outer;
                        }
                    }
                }
            }
        }
        trace!("link reader exiting");
    }

    /// Returns false once nobody is listening any more.
    fn dispatch(&self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        self.counters.lines.fetch_add(1, Ordering::Relaxed);
        let msg = decode(line);
        if msg.is_unrecognized() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(line, "unrecognized line dropped");
            return true;
        }
        debug!(kind = msg.kind(), "line decoded");
        let record = match msg {
            ProtocolMessage::Weight { grams, stable } => Some(WeightRecord {
                grams,
                stable,
                received_ms: u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
            _ => None,
        };
        if self.tx.send(Inbound::Message(msg)).is_err() {
            return false;
        }
        if let Some(record) = record {
            self.counters.weights.fetch_add(1, Ordering::Relaxed);
            if self.tx.send(Inbound::Weight(record)).is_err() {
                return false;
            }
        }
        true
    }
}

pub struct Transport<O: PortOpener> {
    opener: O,
    settings: LinkSettings,
    tx: xch::Sender<Inbound>,
    rx: xch::Receiver<Inbound>,
    writer: Option<Box<dyn Write + Send>>,
    port: Option<String>,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    counters: Arc<LinkCounters>,
    join_handle: Option<JoinHandle<()>>,
    epoch: Instant,
}

impl<O: PortOpener> std::fmt::Debug for Transport<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("port", &self.port)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<O: PortOpener> Transport<O> {
    pub fn new(opener: O, settings: LinkSettings) -> Self {
        let (tx, rx) = xch::unbounded();
        Self {
            opener,
            settings,
            tx,
            rx,
            writer: None,
            port: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(LinkCounters::default()),
            join_handle: None,
            epoch: Instant::now(),
        }
    }

    /// Open `port`, or the first port matching the device signature, and start the
    /// reader. Any previous connection is closed first. On failure no thread is
    /// left running.
    pub fn connect(&mut self, port: Option<&str>) -> Result<String, TransportError> {
        self.disconnect();

        let name = match port {
            Some(p) => p.to_string(),
            None => self.probe()?,
        };
        let halves = self
            .opener
            .open(&name, self.settings.baud, self.settings.read_timeout)
            .map_err(|e| TransportError::Open {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let ctx = ReaderCtx {
            tx: self.tx.clone(),
            shutdown: shutdown.clone(),
            alive: alive.clone(),
            counters: self.counters.clone(),
            max_line_len: self.settings.max_line_len,
            epoch: self.epoch,
        };
        let reader = halves.reader;
        let join_handle = std::thread::Builder::new()
            .name("ecoscale-link-reader".into())
            .spawn(move || ctx.run(reader))
            .map_err(|e| TransportError::Open {
                port: name.clone(),
                reason: format!("spawn reader: {e}"),
            })?;

        self.shutdown = shutdown;
        self.alive = alive;
        self.writer = Some(halves.writer);
        self.join_handle = Some(join_handle);
        self.port = Some(name.clone());
        info!(port = %name, baud = self.settings.baud, "link connected");
        Ok(name)
    }

    fn probe(&self) -> Result<String, TransportError> {
        let ports = self.opener.available().map_err(|e| {
            warn!(error = %e, "port enumeration failed");
            TransportError::NoPort
        })?;
        let found = ports
            .into_iter()
            .find(|p| self.settings.signature.matches(p))
            .map(|p| p.name)
            .ok_or(TransportError::NoPort)?;
        debug!(port = %found, "device signature matched");
        Ok(found)
    }

    /// Stop and join the reader, then drop the handle. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.writer = None;
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => trace!("link reader joined"),
                Err(e) => warn!(?e, "link reader panicked"),
            }
        }
        self.alive.store(false, Ordering::Relaxed);
        if let Some(port) = self.port.take() {
            info!(port = %port, "link disconnected");
        }
    }

    /// Next decoded inbound item, if one is pending.
    pub fn read_next(&self) -> Option<Inbound> {
        self.rx.try_recv().ok()
    }

    /// Encode `msg`, terminate it with a newline and write it out.
    pub fn send(&mut self, msg: &ProtocolMessage) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        let line = encode_line(msg);
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| TransportError::Write(e.to_string()))?;
        debug!(kind = msg.kind(), "line sent");
        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.writer.is_none() {
            ConnectionStatus::Disconnected
        } else if self.alive.load(Ordering::Relaxed) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Lost
        }
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            lines_received: self.counters.lines.load(Ordering::Relaxed),
            weight_records: self.counters.weights.load(Ordering::Relaxed),
            lines_dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }
}

impl<O: PortOpener> ResultSink for Transport<O> {
    fn send_result(&mut self, result: &AnalysisResult) -> Result<(), TransportError> {
        self.send(&ProtocolMessage::AnalysisResult(result.clone()))
    }
}

impl<O: PortOpener> Drop for Transport<O> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
