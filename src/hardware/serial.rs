//! Serial transport over the `serialport` crate
//!
//! Used both by the GoDiag GD101 passthru framing and by the GT100 AT-style
//! command path. The port handle is shared behind a mutex so a telemetry
//! thread can poll voltage while the manager keeps ownership of the
//! transport (same layout as other serial VCI drivers).

use std::{
    io::{Read, Write},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serialport::SerialPort;

use crate::channel::{ChannelError, ChannelResult, Transport, convert_io_error};

/// Pause between writing an AT command and reading its reply. The GT100
/// firmware needs this gap before its response is buffered.
const AT_COMMAND_GAP: Duration = Duration::from_millis(100);

/// Poll interval while waiting for bytes to arrive
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Serial transport
#[derive(Clone)]
pub struct SerialTransport {
    path: String,
    baud: u32,
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SerialTransport {}@{}", self.path, self.baud)
    }
}

impl SerialTransport {
    /// Creates a transport for the given port path and baud rate. The port
    /// is not touched until [Transport::open] is called.
    pub fn new(path: &str, baud: u32) -> Self {
        Self {
            path: path.to_string(),
            baud,
            port: None,
        }
    }

    /// Port path this transport targets
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Clones the shared port handle, for threads that poll the device
    /// (telemetry) while the transport stays owned by its manager
    pub(crate) fn shared_port(&self) -> Option<Arc<Mutex<Box<dyn SerialPort>>>> {
        self.port.clone()
    }

    /// Sends an AT-style command and returns the (lossy ASCII) reply.
    ///
    /// Write, fixed short gap, then one bounded read. Callers match on
    /// substrings of the reply ('OK', 'GT100'), so decoding is tolerant.
    pub fn at_command(&mut self, cmd: &[u8], timeout_ms: u32) -> ChannelResult<String> {
        self.send_bytes(cmd)?;
        std::thread::sleep(AT_COMMAND_GAP);
        let raw = self.read_bytes(timeout_ms)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// Reads whatever is buffered on a shared serial port, polling up to
/// `timeout_ms`. Standalone so the telemetry thread can reuse it with just
/// the port handle.
pub(crate) fn read_buffered(
    port: &Mutex<Box<dyn SerialPort>>,
    timeout_ms: u32,
) -> ChannelResult<Vec<u8>> {
    let start = Instant::now();
    loop {
        {
            let mut guard = port.lock().unwrap();
            let waiting = guard.bytes_to_read().map_err(serialport_error)?;
            if waiting > 0 {
                let mut buf = vec![0u8; waiting as usize];
                guard.read_exact(&mut buf).map_err(convert_io_error)?;
                return Ok(buf);
            }
        }
        if start.elapsed().as_millis() as u32 >= timeout_ms {
            return Err(ChannelError::ReadTimeout);
        }
        std::thread::sleep(READ_POLL_INTERVAL);
    }
}

/// Writes a command to a shared serial port. Companion to [read_buffered].
pub(crate) fn write_all(port: &Mutex<Box<dyn SerialPort>>, buffer: &[u8]) -> ChannelResult<()> {
    let mut guard = port.lock().unwrap();
    guard.write_all(buffer).map_err(convert_io_error)?;
    guard.flush().map_err(convert_io_error)
}

fn serialport_error(e: serialport::Error) -> ChannelError {
    ChannelError::APIError {
        api_name: "serialport".into(),
        desc: e.to_string(),
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> ChannelResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.path, self.baud)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(serialport_error)?;
        log::debug!("Opened serial port {} at {} baud", self.path, self.baud);
        self.port = Some(Arc::new(Mutex::new(port)));
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        // Dropping the last Arc closes the OS handle
        if self.port.take().is_some() {
            log::debug!("Closed serial port {}", self.path);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send_bytes(&mut self, buffer: &[u8]) -> ChannelResult<()> {
        match &self.port {
            Some(p) => write_all(p, buffer),
            None => Err(ChannelError::InterfaceNotOpen),
        }
    }

    fn read_bytes(&mut self, timeout_ms: u32) -> ChannelResult<Vec<u8>> {
        match &self.port {
            Some(p) => read_buffered(p, timeout_ms),
            None => Err(ChannelError::InterfaceNotOpen),
        }
    }
}
