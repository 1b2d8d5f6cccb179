//! Controller endpoints
//!
//! Each active hub owns one line-oriented endpoint to its controller. The
//! [`EndpointFactory`] seam lets the agent run against real serial ports or
//! against the in-memory [`RecordingEndpointFactory`] used by `--list` and
//! the test suites.

use common::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// An open line-oriented connection to one controller
///
/// Dropping the endpoint closes it.
pub trait Endpoint: Send {
    /// Write one line; the terminator is appended here
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one reply line; `Ok(None)` when nothing arrived before the timeout
    fn read_line(&mut self) -> Result<Option<String>>;
}

/// Opens endpoints by serial port name
pub trait EndpointFactory: Send + Sync {
    fn open(&self, name: &str) -> Result<Box<dyn Endpoint>>;
}

/// Device path for a serial port name: `ttyACM0` → `/dev/ttyACM0`, `COM5` as-is
pub fn endpoint_path(name: &str) -> String {
    if name.starts_with("tty") {
        format!("/dev/{}", name)
    } else {
        name.to_string()
    }
}

/// Opens real serial ports, 8N1 without flow control and with DTR asserted
#[derive(Debug, Clone)]
pub struct SerialEndpointFactory {
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl EndpointFactory for SerialEndpointFactory {
    fn open(&self, name: &str) -> Result<Box<dyn Endpoint>> {
        let path = endpoint_path(name);
        let mut port = serialport::new(&path, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()
            .map_err(|e| Error::serial(&path, e))?;

        port.write_data_terminal_ready(true)
            .map_err(|e| Error::serial(&path, format!("DTR: {}", e)))?;

        debug!("Opened serial endpoint {} at {} baud", path, self.baud_rate);
        Ok(Box::new(SerialEndpoint {
            port,
            pending: Vec::new(),
        }))
    }
}

struct SerialEndpoint {
    port: Box<dyn serialport::SerialPort>,
    pending: Vec<u8>,
}

impl Endpoint for SerialEndpoint {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut chunk = [0u8; 256];
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let rest = self.pending.split_off(pos + 1);
                let line = std::mem::replace(&mut self.pending, rest);
                let text = String::from_utf8_lossy(&line);
                return Ok(Some(text.trim_end().to_string()));
            }

            match self.port.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Everything a [`RecordingEndpointFactory`] has seen
#[derive(Debug, Default)]
pub struct EndpointLog {
    pub opens: usize,
    pub closes: usize,
    /// Lines written, per endpoint name, oldest first
    pub written: BTreeMap<String, Vec<String>>,
    /// Names whose open attempts fail
    pub unavailable: BTreeSet<String>,
    /// When set, every write fails
    pub fail_writes: bool,
}

/// In-memory endpoints that record traffic instead of touching hardware
#[derive(Debug, Clone, Default)]
pub struct RecordingEndpointFactory {
    log: Arc<Mutex<EndpointLog>>,
}

impl RecordingEndpointFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect or adjust the shared log
    pub fn log(&self) -> MutexGuard<'_, EndpointLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_count(&self) -> usize {
        self.log().opens
    }

    pub fn close_count(&self) -> usize {
        self.log().closes
    }

    /// Endpoints currently open
    pub fn live_count(&self) -> usize {
        let log = self.log();
        log.opens - log.closes
    }

    /// Lines written to one endpoint
    pub fn lines(&self, name: &str) -> Vec<String> {
        self.log().written.get(name).cloned().unwrap_or_default()
    }

    pub fn set_unavailable(&self, name: &str, unavailable: bool) {
        let mut log = self.log();
        if unavailable {
            log.unavailable.insert(name.to_string());
        } else {
            log.unavailable.remove(name);
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.log().fail_writes = fail;
    }
}

impl EndpointFactory for RecordingEndpointFactory {
    fn open(&self, name: &str) -> Result<Box<dyn Endpoint>> {
        let mut log = self.log();
        if log.unavailable.contains(name) {
            return Err(Error::Unavailable(name.to_string()));
        }
        log.opens += 1;
        Ok(Box::new(RecordingEndpoint {
            name: name.to_string(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct RecordingEndpoint {
    name: String,
    log: Arc<Mutex<EndpointLog>>,
}

impl RecordingEndpoint {
    fn log(&self) -> MutexGuard<'_, EndpointLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Endpoint for RecordingEndpoint {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut log = self.log();
        if log.fail_writes {
            return Err(Error::WriteFailed(self.name.clone()));
        }
        log.written
            .entry(self.name.clone())
            .or_default()
            .push(line.to_string());
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(Some(r#"{"status":"ok","data":{}}"#.to_string()))
    }
}

impl Drop for RecordingEndpoint {
    fn drop(&mut self) {
        self.log().closes += 1;
    }
}
