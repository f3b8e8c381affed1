//! Voltage and current monitoring thread for a connected GT100
//!
//! Polls at 1 Hz and overwrites the shared device record under its mutex.
//! The loop carries a hard iteration cap of one hour so a forgotten
//! connection cannot monitor forever, and a stop flag so disconnect can
//! join the thread within roughly one interval.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use serialport::SerialPort;

use crate::hardware::{
    gt100::{Gt100Device, lock},
    serial,
};

/// Poll interval
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
/// Hard cap on monitoring iterations (one hour at 1 Hz)
const MAX_PULSES: u32 = 3600;
/// Input voltage below this is logged as a warning
const LOW_INPUT_VOLTAGE: f32 = 11.0;
/// Input voltage above this is logged as a warning
const HIGH_INPUT_VOLTAGE: f32 = 25.0;
/// Read budget for one ATCV reply
const VOLTAGE_REPLY_TIMEOUT_MS: u32 = 1000;

/// One voltage/current reading
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Battery-side input voltage
    pub voltage_input: f32,
    /// Vehicle-side output voltage
    pub voltage_output: f32,
    /// Current draw in amps
    pub current_draw: f32,
}

/// Where the monitoring thread gets its readings from
pub(crate) enum TelemetrySource {
    /// Query the device over its shared serial port with `ATCV`
    Serial(Arc<Mutex<Box<dyn SerialPort>>>),
    /// USB and DOIP links have no telemetry query; report nominal values
    Nominal,
}

impl std::fmt::Debug for TelemetrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetrySource::Serial(_) => write!(f, "TelemetrySource::Serial"),
            TelemetrySource::Nominal => write!(f, "TelemetrySource::Nominal"),
        }
    }
}

/// Nominal healthy readings: 24 V supply, 12.4 V output, 150 mA draw
pub(crate) fn nominal_snapshot() -> TelemetrySnapshot {
    TelemetrySnapshot {
        voltage_input: 24.0,
        voltage_output: 12.4,
        current_draw: 0.15,
    }
}

/// Pulls the first parseable voltage figure out of an ATCV reply such as
/// `"12.4V\r\nOK"`
pub(crate) fn parse_voltage(reply: &str) -> Option<f32> {
    reply
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|token| !token.is_empty())
        .find_map(|token| token.parse::<f32>().ok())
}

fn read_serial_snapshot(port: &Mutex<Box<dyn SerialPort>>) -> TelemetrySnapshot {
    let mut snapshot = nominal_snapshot();
    if let Err(e) = serial::write_all(port, b"ATCV\r") {
        log::error!("Serial voltage read failed: {e}");
        return snapshot;
    }
    std::thread::sleep(Duration::from_millis(100));
    match serial::read_buffered(port, VOLTAGE_REPLY_TIMEOUT_MS) {
        Ok(raw) => {
            if let Some(v) = parse_voltage(&String::from_utf8_lossy(&raw)) {
                snapshot.voltage_output = v;
            }
        }
        Err(e) => log::error!("Serial voltage read failed: {e}"),
    }
    snapshot
}

/// Handle to a running monitoring thread
#[derive(Debug)]
pub(crate) struct TelemetryHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryHandle {
    /// Signals the loop to stop and joins it. Bounded by one poll interval.
    pub(crate) fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TelemetryHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Starts the monitoring thread for a connected device
pub(crate) fn spawn(device: Arc<Mutex<Gt100Device>>, source: TelemetrySource) -> TelemetryHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = stop.clone();
    let handle = std::thread::spawn(move || {
        monitor_loop(&device, &source, &thread_stop);
    });
    log::info!("GT100 voltage monitoring started");
    TelemetryHandle {
        stop,
        handle: Some(handle),
    }
}

fn monitor_loop(device: &Arc<Mutex<Gt100Device>>, source: &TelemetrySource, stop: &AtomicBool) {
    let mut pulse_count = 0u32;
    while !stop.load(Ordering::Relaxed) {
        pulse_count += 1;
        if pulse_count > MAX_PULSES {
            log::warn!("Voltage monitoring pulse limit reached, stopping");
            break;
        }

        let snapshot = match source {
            TelemetrySource::Serial(port) => read_serial_snapshot(port),
            TelemetrySource::Nominal => nominal_snapshot(),
        };

        {
            let mut dev = lock(device);
            dev.voltage_input = Some(snapshot.voltage_input);
            dev.voltage_output = Some(snapshot.voltage_output);
            dev.current_draw = Some(snapshot.current_draw);
            dev.last_seen = Some(Instant::now());
        }

        if snapshot.voltage_input < LOW_INPUT_VOLTAGE {
            log::warn!("GT100 low input voltage: {}V", snapshot.voltage_input);
        } else if snapshot.voltage_input > HIGH_INPUT_VOLTAGE {
            log::warn!("GT100 high input voltage: {}V", snapshot.voltage_input);
        }
        if pulse_count % 100 == 0 {
            log::debug!("Voltage monitoring pulse #{pulse_count}");
        }

        // Sleep in short slices so a stop request joins quickly
        let sleep_until = Instant::now() + MONITOR_INTERVAL;
        while Instant::now() < sleep_until && !stop.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_parsing_tolerates_firmware_noise() {
        assert_eq!(parse_voltage("12.4V\r\nOK"), Some(12.4));
        assert_eq!(parse_voltage("ATCV\r12.6"), Some(12.6));
        assert_eq!(parse_voltage("OK"), None);
        assert_eq!(parse_voltage(""), None);
    }

    #[test]
    fn nominal_readings_are_in_the_healthy_band() {
        let snap = nominal_snapshot();
        assert!(snap.voltage_input >= LOW_INPUT_VOLTAGE);
        assert!(snap.voltage_input <= HIGH_INPUT_VOLTAGE);
        assert_eq!(snap.voltage_output, 12.4);
        assert_eq!(snap.current_draw, 0.15);
    }

    #[test]
    fn monitoring_updates_the_shared_record_and_stops() {
        let device = Arc::new(Mutex::new(Gt100Device::serial("/dev/null")));
        let handle = spawn(device.clone(), TelemetrySource::Nominal);
        // First pulse runs immediately
        std::thread::sleep(Duration::from_millis(200));
        handle.stop();
        let dev = lock(&device);
        assert_eq!(dev.voltage_input, Some(24.0));
        assert_eq!(dev.voltage_output, Some(12.4));
        assert_eq!(dev.current_draw, Some(0.15));
        assert!(dev.last_seen.is_some());
    }
}
