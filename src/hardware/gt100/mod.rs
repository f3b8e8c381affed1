//! GoDiag GT100 PLUS GPT breakout box support
//!
//! The GT100 is reachable three ways: USB bulk (vendor-specific device),
//! DOIP over Ethernet, or a plain serial port speaking AT-style commands.
//! [Gt100Manager] owns the connection state machine on top of the raw
//! transports, [scanner] discovers devices over USB and the local network,
//! and [telemetry] runs the 1 Hz voltage/current monitoring thread.

pub mod scanner;
pub mod telemetry;

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::{
    channel::{ChannelError, Transport},
    doip,
    hardware::{HardwareError, HardwareResult, serial::SerialTransport, tcp::TcpTransport, usb},
};

pub use telemetry::TelemetrySnapshot;

/// USB vendor ID the GT100 enumerates with
pub const GT100_USB_VID: u16 = 0x1EAB;
/// USB product ID the GT100 enumerates with
pub const GT100_USB_PID: u16 = 0x9001;
/// Baud rate of the serial AT-command link
pub const GT100_SERIAL_BAUD: u32 = 115200;

/// Timeout for one AT command round trip
const AT_REPLY_TIMEOUT_MS: u32 = 5000;
/// Timeout for the DOIP activation exchange
const DOIP_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state of a GT100 device
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum Gt100Status {
    /// No link to the device
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Link established and identified
    Connected,
    /// Connected with DOIP diagnostics activated
    DoipActive,
    /// Connected with GPT (programming) mode enabled
    GptMode,
    /// The last connection attempt failed
    Error,
}

/// How a GT100 device is (or would be) reached
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum ConnectionKind {
    /// USB bulk endpoints on the vendor-specific interface
    Usb,
    /// DOIP over a TCP socket
    Doip,
    /// Serial AT-command link
    Serial,
}

/// Protocols the GT100 indicates on its breakout LEDs
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum Gt100Protocol {
    /// ISO 15765-4 CAN at 500 kbps
    #[strum(serialize = "ISO 15765-4 CAN 500kbps")]
    Can500k,
    /// ISO 9141-2 K-Line
    #[strum(serialize = "ISO 9141-2 K-Line")]
    KLine,
    /// J1850 VPW
    #[strum(serialize = "J1850 VPW")]
    J1850Vpw,
}

/// OBD2 breakout pins with a detection LED on the box
const LED_PINS: [&str; 7] = [
    "pin_1", "pin_3", "pin_8", "pin_9", "pin_11", "pin_12", "pin_13",
];

/// Everything known about one discovered or connected GT100
#[derive(Debug, Clone)]
pub struct Gt100Device {
    /// Device family string
    pub device_type: String,
    /// Display name
    pub name: String,
    /// Port identifier (`USB_<bus>_<addr>`, `DOIP_<ip>:<port>` or a serial
    /// port path)
    pub port: String,
    /// USB serial number, when enumerated over USB
    pub serial_number: Option<String>,
    /// Firmware/product string, when the device reports one
    pub firmware_version: Option<String>,
    /// Transport this device is reached over
    pub connection: ConnectionKind,
    /// Current connection state
    pub status: Gt100Status,
    /// Measured input voltage (battery side, 9-24 V)
    pub voltage_input: Option<f32>,
    /// Measured output voltage (vehicle side, nominally 12 V)
    pub voltage_output: Option<f32>,
    /// Measured current draw in amps
    pub current_draw: Option<f32>,
    /// Per-pin protocol detection LED states
    pub protocol_leds: BTreeMap<&'static str, bool>,
    /// IP address, for Ethernet devices
    pub ethernet_ip: Option<String>,
    /// When the device was last seen alive
    pub last_seen: Option<Instant>,
}

impl Gt100Device {
    fn base(port: String, connection: ConnectionKind) -> Self {
        Self {
            device_type: "GoDiag GT100 PLUS GPT".to_string(),
            name: "GoDiag GT100 PLUS GPT (SO537-C)".to_string(),
            port,
            serial_number: None,
            firmware_version: None,
            connection,
            status: Gt100Status::Disconnected,
            voltage_input: None,
            voltage_output: None,
            current_draw: None,
            protocol_leds: LED_PINS.iter().map(|&pin| (pin, false)).collect(),
            ethernet_ip: None,
            last_seen: None,
        }
    }

    /// Device record for a USB-enumerated GT100
    pub fn usb(info: &usb::UsbDeviceInfo) -> Self {
        let mut dev = Self::base(
            format!("USB_{:0>3}_{:03}", info.bus_id, info.address),
            ConnectionKind::Usb,
        );
        dev.serial_number = info.serial_number.clone();
        dev.firmware_version = info.product.clone();
        dev.last_seen = Some(Instant::now());
        dev
    }

    /// Device record for a GT100 found on the network
    pub fn doip(ip: &str, tcp_port: u16) -> Self {
        let mut dev = Self::base(format!("DOIP_{ip}:{tcp_port}"), ConnectionKind::Doip);
        dev.ethernet_ip = Some(ip.to_string());
        dev.last_seen = Some(Instant::now());
        dev
    }

    /// Device record for a GT100 on a plain serial port
    pub fn serial(port_path: &str) -> Self {
        Self::base(port_path.to_string(), ConnectionKind::Serial)
    }

    /// Protocols whose detection LEDs are currently lit
    pub fn active_protocols(&self) -> Vec<Gt100Protocol> {
        let mut protocols = Vec::new();
        let mut push = |p: Gt100Protocol| {
            if !protocols.contains(&p) {
                protocols.push(p);
            }
        };
        // Walk pins in breakout-box order, not map key order (pin_11 sorts
        // before pin_8 lexicographically)
        for pin in LED_PINS {
            if !self.protocol_leds.get(pin).copied().unwrap_or(false) {
                continue;
            }
            match pin {
                "pin_8" | "pin_9" => push(Gt100Protocol::Can500k),
                "pin_11" => push(Gt100Protocol::KLine),
                "pin_12" => push(Gt100Protocol::J1850Vpw),
                _ => {}
            }
        }
        protocols
    }

    /// TCP port encoded in a `DOIP_<ip>:<port>` port string, falling back to
    /// the standard DOIP port
    fn doip_tcp_port(&self) -> u16 {
        self.port
            .rsplit_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(doip::DOIP_PORT)
    }
}

/// Connection manager for one GT100 device at a time.
///
/// At most one device is connected per manager; connecting while a device is
/// already attached tears the old connection down first. A connect attempt
/// always leaves the device record in a settled state (Connected, DoipActive
/// or Error), never in Connecting.
#[derive(Debug, Default)]
pub struct Gt100Manager {
    connected: Option<Arc<Mutex<Gt100Device>>>,
    doip_link: Option<TcpTransport>,
    serial_link: Option<SerialTransport>,
    usb_link: Option<crate::hardware::usb::UsbTransport>,
    telemetry: Option<telemetry::TelemetryHandle>,
}

impl Gt100Manager {
    /// Creates a manager with nothing connected
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently connected device record, shared with the telemetry
    /// thread
    pub fn connected_device(&self) -> Option<Arc<Mutex<Gt100Device>>> {
        self.connected.clone()
    }

    /// True while a device is attached in any live state
    pub fn is_connected(&self) -> bool {
        match &self.connected {
            Some(dev) => matches!(
                lock(dev).status,
                Gt100Status::Connected | Gt100Status::GptMode | Gt100Status::DoipActive
            ),
            None => false,
        }
    }

    /// Connects to the device described by `device`, dispatching on its
    /// [ConnectionKind]. On failure the record is left in
    /// [Gt100Status::Error] and the error returned; there is no auto-retry.
    pub fn connect(&mut self, device: &Arc<Mutex<Gt100Device>>) -> HardwareResult<()> {
        if self.connected.is_some() {
            log::warn!("Already connected to a GT100, disconnecting first");
            self.disconnect()?;
        }

        let (name, kind) = {
            let mut dev = lock(device);
            dev.status = Gt100Status::Connecting;
            (dev.name.clone(), dev.connection)
        };
        log::info!("Connecting to {name} via {kind}...");

        let result = match kind {
            ConnectionKind::Usb => self.connect_usb(),
            ConnectionKind::Doip => self.connect_doip(device),
            ConnectionKind::Serial => self.connect_serial(device),
        };

        match result {
            Ok(status) => {
                {
                    let mut dev = lock(device);
                    dev.status = status;
                    dev.last_seen = Some(Instant::now());
                }
                self.connected = Some(device.clone());
                self.start_telemetry(device);
                log::info!("Successfully connected to {name}");
                Ok(())
            }
            Err(e) => {
                lock(device).status = Gt100Status::Error;
                self.close_links();
                log::error!("Failed to connect to {name}: {e}");
                Err(e)
            }
        }
    }

    fn connect_usb(&mut self) -> HardwareResult<Gt100Status> {
        if usb::list_matching(GT100_USB_VID, GT100_USB_PID)?.is_empty() {
            return Err(HardwareError::DeviceNotFound);
        }
        let mut link = crate::hardware::usb::UsbTransport::new(GT100_USB_VID, GT100_USB_PID);
        link.open()?;
        self.usb_link = Some(link);
        log::info!("GT100 connected via USB");
        Ok(Gt100Status::Connected)
    }

    fn connect_doip(&mut self, device: &Arc<Mutex<Gt100Device>>) -> HardwareResult<Gt100Status> {
        let (ip, tcp_port) = {
            let dev = lock(device);
            let ip = dev.ethernet_ip.clone().ok_or(HardwareError::DeviceNotFound)?;
            (ip, dev.doip_tcp_port())
        };

        let mut link = TcpTransport::new(&ip, tcp_port, DOIP_EXCHANGE_TIMEOUT)?;
        link.open()?;
        link.send_bytes(&doip::vehicle_identification_request())?;
        let response = link.read_bytes(DOIP_EXCHANGE_TIMEOUT.as_millis() as u32)?;
        if !doip::is_activation_response(&response) {
            link.close()?;
            return Err(HardwareError::ActivationRejected);
        }
        self.doip_link = Some(link);
        log::info!("GT100 connected via DOIP: {ip}:{tcp_port}");
        Ok(Gt100Status::DoipActive)
    }

    fn connect_serial(&mut self, device: &Arc<Mutex<Gt100Device>>) -> HardwareResult<Gt100Status> {
        let port_path = lock(device).port.clone();
        let mut link = SerialTransport::new(&port_path, GT100_SERIAL_BAUD);
        link.open()?;
        let reply = link.at_command(b"ATI\r", AT_REPLY_TIMEOUT_MS)?;
        if !reply.contains("GT100") && !reply.contains("GoDiag") {
            link.close()?;
            return Err(HardwareError::IdentificationFailed);
        }
        self.serial_link = Some(link);
        log::info!("GT100 connected via serial: {port_path}");
        Ok(Gt100Status::Connected)
    }

    fn start_telemetry(&mut self, device: &Arc<Mutex<Gt100Device>>) {
        let source = match self.serial_link.as_ref().and_then(|s| s.shared_port()) {
            Some(port) => telemetry::TelemetrySource::Serial(port),
            None => telemetry::TelemetrySource::Nominal,
        };
        self.telemetry = Some(telemetry::spawn(device.clone(), source));
    }

    fn close_links(&mut self) {
        // Best-effort teardown; closing our transports cannot fail in a way
        // worth surfacing during cleanup
        if let Some(mut link) = self.doip_link.take() {
            let _ = link.close();
        }
        if let Some(mut link) = self.serial_link.take() {
            let _ = link.close();
        }
        if let Some(mut link) = self.usb_link.take() {
            let _ = link.close();
        }
    }

    /// Drops the current connection: stops telemetry (bounded join), closes
    /// all transports and marks the record Disconnected. Idempotent.
    pub fn disconnect(&mut self) -> HardwareResult<()> {
        if let Some(handle) = self.telemetry.take() {
            handle.stop();
        }
        self.close_links();
        if let Some(device) = self.connected.take() {
            let mut dev = lock(&device);
            dev.status = Gt100Status::Disconnected;
            log::info!("Disconnected from {}", dev.name);
        }
        Ok(())
    }

    /// Switches the GT100 into GPT (programming) mode. Only valid from
    /// [Gt100Status::Connected], and only over the serial link.
    pub fn enable_gpt_mode(&mut self) -> HardwareResult<()> {
        self.gpt_transition(Gt100Status::Connected, b"AT+GPT\r", Gt100Status::GptMode)?;
        log::info!("GPT mode enabled");
        Ok(())
    }

    /// Switches the GT100 back out of GPT mode
    pub fn disable_gpt_mode(&mut self) -> HardwareResult<()> {
        self.gpt_transition(Gt100Status::GptMode, b"AT-GPT\r", Gt100Status::Connected)?;
        log::info!("GPT mode disabled");
        Ok(())
    }

    fn gpt_transition(
        &mut self,
        from: Gt100Status,
        cmd: &[u8],
        to: Gt100Status,
    ) -> HardwareResult<()> {
        let device = self.connected.clone().ok_or(HardwareError::DeviceNotConnected)?;
        {
            let dev = lock(&device);
            if dev.status != from {
                return Err(HardwareError::InvalidState {
                    state: dev.status.to_string(),
                });
            }
        }
        // GPT mode is driven over the serial AT link only
        let serial = self
            .serial_link
            .as_mut()
            .ok_or(ChannelError::UnsupportedRequest)
            .map_err(HardwareError::from)?;
        let reply = serial.at_command(cmd, AT_REPLY_TIMEOUT_MS)?;
        if !reply.contains("OK") {
            return Err(HardwareError::CommandRejected);
        }
        lock(&device).status = to;
        Ok(())
    }

    /// Opens a diagnostic session with an ECU over the active DOIP socket
    /// by sending a DiagnosticSessionControl request wrapped in a DOIP
    /// diagnostic message
    pub fn enable_doip_diagnostics(&mut self, ecu_address: u16) -> HardwareResult<()> {
        let device = self.connected.clone().ok_or(HardwareError::DeviceNotConnected)?;
        let link = self
            .doip_link
            .as_mut()
            .ok_or(ChannelError::UnsupportedRequest)
            .map_err(HardwareError::from)?;
        let frame = doip::diagnostic_message(ecu_address, &[0x10, 0x01]);
        link.send_bytes(&frame)?;
        let response = link.read_bytes(DOIP_EXCHANGE_TIMEOUT.as_millis() as u32)?;
        if !doip::is_activation_response(&response) {
            return Err(HardwareError::ActivationRejected);
        }
        lock(&device).status = Gt100Status::DoipActive;
        log::info!("DOIP diagnostics enabled for ECU 0x{ecu_address:04X}");
        Ok(())
    }
}

impl Drop for Gt100Manager {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

/// Locks a shared device record, recovering from a poisoned mutex (a
/// panicked telemetry thread must not wedge the manager)
pub(crate) fn lock(device: &Arc<Mutex<Gt100Device>>) -> std::sync::MutexGuard<'_, Gt100Device> {
    device.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_constructors_tag_connection_kind() {
        let info = usb::UsbDeviceInfo {
            bus_id: "1".to_string(),
            address: 7,
            serial_number: Some("SO537".to_string()),
            product: Some("GT100 PLUS GPT".to_string()),
        };
        let dev = Gt100Device::usb(&info);
        assert_eq!(dev.connection, ConnectionKind::Usb);
        assert_eq!(dev.port, "USB_001_007");

        let dev = Gt100Device::doip("192.168.1.50", 13400);
        assert_eq!(dev.connection, ConnectionKind::Doip);
        assert_eq!(dev.port, "DOIP_192.168.1.50:13400");
        assert_eq!(dev.ethernet_ip.as_deref(), Some("192.168.1.50"));
        assert_eq!(dev.doip_tcp_port(), 13400);

        let dev = Gt100Device::serial("/dev/ttyUSB0");
        assert_eq!(dev.connection, ConnectionKind::Serial);
        assert_eq!(dev.status, Gt100Status::Disconnected);
    }

    #[test]
    fn led_map_drives_protocol_detection() {
        let mut dev = Gt100Device::serial("/dev/ttyUSB0");
        assert!(dev.active_protocols().is_empty());
        dev.protocol_leds.insert("pin_8", true);
        dev.protocol_leds.insert("pin_9", true);
        dev.protocol_leds.insert("pin_11", true);
        // CAN high and low share one protocol entry
        assert_eq!(
            dev.active_protocols(),
            vec![Gt100Protocol::Can500k, Gt100Protocol::KLine]
        );
    }

    #[test]
    fn failed_connect_settles_in_error_state() {
        let mut manager = Gt100Manager::new();
        // DOIP device with no IP address fails before any socket is opened
        let mut dev = Gt100Device::doip("192.168.1.50", 13400);
        dev.ethernet_ip = None;
        let device = Arc::new(Mutex::new(dev));
        assert!(matches!(
            manager.connect(&device),
            Err(HardwareError::DeviceNotFound)
        ));
        // Never left in Connecting
        assert_eq!(lock(&device).status, Gt100Status::Error);
        assert!(!manager.is_connected());
    }

    #[test]
    fn mode_changes_require_a_connection() {
        let mut manager = Gt100Manager::new();
        assert!(matches!(
            manager.enable_gpt_mode(),
            Err(HardwareError::DeviceNotConnected)
        ));
        assert!(matches!(
            manager.enable_doip_diagnostics(0x07E0),
            Err(HardwareError::DeviceNotConnected)
        ));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut manager = Gt100Manager::new();
        assert!(manager.disconnect().is_ok());
        assert!(manager.disconnect().is_ok());
        assert!(!manager.is_connected());
    }
}
