//! USB serial transport for the line protocol.

use std::io::{Read, Write};
use std::time::Duration;

use ecoscale_traits::{BoxError, LineIo, LinkHalves, PortInfo, PortOpener};
use serialport::{DataBits, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use tracing::{debug, warn};

use crate::error::{HwError, Result};
use crate::util::take_line;

/// Longest pending input kept by [`SerialLineIo`] before it is discarded.
const MAX_PENDING: usize = 1024;

fn open_8n1(name: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(name, baud)
        .timeout(timeout)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open()?;
    Ok(port)
}

fn port_info(p: SerialPortInfo) -> PortInfo {
    match p.port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            name: p.port_name,
            description: usb.product.or(usb.manufacturer),
            usb_vid: Some(usb.vid),
            usb_pid: Some(usb.pid),
        },
        SerialPortType::BluetoothPort => PortInfo {
            name: p.port_name,
            description: Some("Bluetooth".into()),
            ..PortInfo::default()
        },
        SerialPortType::PciPort => PortInfo {
            name: p.port_name,
            description: Some("PCI".into()),
            ..PortInfo::default()
        },
        SerialPortType::Unknown => PortInfo {
            name: p.port_name,
            ..PortInfo::default()
        },
    }
}

/// Host-side opener backed by the operating system's serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    fn available(&self) -> std::result::Result<Vec<PortInfo>, BoxError> {
        let ports = serialport::available_ports().map_err(HwError::from)?;
        Ok(ports.into_iter().map(port_info).collect())
    }

    fn open(
        &self,
        name: &str,
        baud: u32,
        read_timeout: Duration,
    ) -> std::result::Result<LinkHalves, BoxError> {
        let port = open_8n1(name, baud, read_timeout)?;
        let writer = port.try_clone().map_err(HwError::from)?;
        debug!(port = name, baud, "serial port opened");
        Ok(LinkHalves {
            reader: Box::new(port),
            writer: Box::new(writer),
        })
    }
}

/// Device-side, non-blocking line link over a serial port.
pub struct SerialLineIo {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialLineIo {
    pub fn open(name: &str, baud: u32) -> Result<Self> {
        let port = open_8n1(name, baud, Duration::from_millis(10))?;
        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    fn fill(&mut self) -> Result<()> {
        let waiting = self.port.bytes_to_read()?;
        if waiting == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; waiting as usize];
        let n = self.port.read(&mut buf)?;
        self.pending.extend_from_slice(&buf[..n]);
        if self.pending.len() > MAX_PENDING && !self.pending.contains(&b'\n') {
            warn!(len = self.pending.len(), "serial input overflow, discarding");
            self.pending.clear();
        }
        Ok(())
    }
}

impl LineIo for SerialLineIo {
    fn poll_line(&mut self) -> Option<String> {
        if let Some(line) = take_line(&mut self.pending) {
            return Some(line);
        }
        if let Err(e) = self.fill() {
            debug!(error = %e, "serial poll failed");
            return None;
        }
        take_line(&mut self.pending)
    }

    fn send_line(&mut self, line: &str) -> std::result::Result<(), BoxError> {
        self.port.write_all(line.as_bytes()).map_err(HwError::from)?;
        self.port.write_all(b"\n").map_err(HwError::from)?;
        self.port.flush().map_err(HwError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bluetooth_ports_are_labelled() {
        let info = port_info(SerialPortInfo {
            port_name: "/dev/rfcomm0".into(),
            port_type: SerialPortType::BluetoothPort,
        });
        assert_eq!(info.description.as_deref(), Some("Bluetooth"));
        assert!(info.usb_pid.is_none());
    }

    #[test]
    fn unknown_ports_have_no_description() {
        let info = port_info(SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        });
        assert_eq!(info.name, "/dev/ttyS0");
        assert!(info.description.is_none());
        assert!(info.usb_vid.is_none());
    }
}
