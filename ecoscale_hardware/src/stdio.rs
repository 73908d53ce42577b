use std::io::{BufRead, Write};

use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use ecoscale_traits::{BoxError, LineIo};
use tracing::debug;

/// Line link over this process's stdin/stdout.
///
/// A detached thread reads stdin; it ends when stdin closes.
pub struct StdioLineIo {
    rx: Receiver<String>,
    closed: bool,
}

impl StdioLineIo {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        std::thread::Builder::new()
            .name("ecoscale-stdin".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self { rx, closed: false })
    }

    /// `true` once stdin has reached end of file and every line was consumed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl LineIo for StdioLineIo {
    fn poll_line(&mut self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(line) => Some(line.trim_end_matches('\r').to_string()),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.closed {
                    debug!("stdin closed");
                    self.closed = true;
                }
                None
            }
        }
    }

    fn send_line(&mut self, line: &str) -> Result<(), BoxError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}
