//! Serial port transport implementation using the `serialport` crate.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use super::traits::{Transport, TransportError};
use crate::reactor::Interest;

/// UART link to the bootloader: 8-N-1, optional RTS/CTS.
///
/// The port is opened with a zero timeout so reads and writes never block;
/// a timeout is reported as `WouldBlock`.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`.
    pub fn open(path: &str, baud_rate: u32, hardware_flow_control: bool) -> Result<Self, TransportError> {
        let flow = if hardware_flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(flow)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| TransportError::OpenFailed(format!("{}: {}", path, e)))?;

        info!(port = %path, baud = baud_rate, flow = ?flow, "Serial port opened");
        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn map_io(e: std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            TransportError::WouldBlock
        }
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            TransportError::Disconnected
        }
        _ => TransportError::Io(e),
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.port.read(buf).map_err(map_io)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.port.write(data).map_err(map_io)
    }

    fn poll_ready(&mut self, interest: Interest) -> Result<bool, TransportError> {
        match interest {
            Interest::Readable => {
                let pending = self
                    .port
                    .bytes_to_read()
                    .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
                Ok(pending > 0)
            }
            Interest::Writable => {
                let queued = self
                    .port
                    .bytes_to_write()
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                if queued > 0 {
                    debug!(queued, "Serial output still draining");
                }
                Ok(queued == 0)
            }
        }
    }
}
