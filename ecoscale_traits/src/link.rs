//! Physical link seams.
//!
//! The host owns a byte stream split into an independent read half (used only by the
//! transport's reader thread) and a write half (used by the caller). The device side
//! only ever needs whole text lines, polled without blocking.
use std::io::{Read, Write};
use std::time::Duration;

use crate::BoxError;

/// A port the host could open, as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: Option<String>,
    pub usb_vid: Option<u16>,
    pub usb_pid: Option<u16>,
}

/// The two halves of an opened link.
///
/// Reads on `reader` must return within roughly the configured read timeout; a read
/// that finds nothing pending yields `ErrorKind::TimedOut`/`WouldBlock` or `Ok(0)`.
pub struct LinkHalves {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

impl std::fmt::Debug for LinkHalves {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHalves").finish_non_exhaustive()
    }
}

/// Enumerates and opens ports with a fixed baud/framing configuration.
pub trait PortOpener: Send {
    fn available(&self) -> Result<Vec<PortInfo>, BoxError>;
    fn open(&self, name: &str, baud: u32, read_timeout: Duration) -> Result<LinkHalves, BoxError>;
}

/// Line-oriented, non-blocking I/O used by the device loop.
pub trait LineIo {
    /// Next complete inbound line (without terminator), if one is pending.
    fn poll_line(&mut self) -> Option<String>;
    /// Write one line; the implementation appends the terminator.
    fn send_line(&mut self, line: &str) -> Result<(), BoxError>;
}

impl<L: LineIo + ?Sized> LineIo for Box<L> {
    fn poll_line(&mut self) -> Option<String> {
        (**self).poll_line()
    }

    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        (**self).send_line(line)
    }
}
