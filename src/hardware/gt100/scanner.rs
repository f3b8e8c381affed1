//! GT100 device discovery over USB enumeration and the local network
//!
//! The scan runs two probe phases: USB (vendor/product ID match) and ENET
//! (TCP connect plus HTTP banner check across a fixed set of workshop
//! subnets and ports). The serial path is a connect-time fallback and is
//! never probed here. The overall deadline is checked between phases and
//! between hosts, never mid-connect, so a slow host can overshoot the
//! deadline by at most one probe timeout.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    channel::Transport,
    hardware::{
        gt100::{GT100_USB_PID, GT100_USB_VID, Gt100Device},
        tcp::TcpTransport,
        usb,
    },
};

/// Subnets probed during the ENET phase (each scanned as a /24)
const ENET_SUBNETS: [[u8; 3]; 3] = [[192, 168, 1], [192, 168, 10], [10, 0, 0]];

/// Ports probed on each host: standard DOIP plus the web UI ports
const ENET_PORTS: [u16; 3] = [13400, 8080, 80];

/// Scan tuning knobs
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Budget for the whole scan; partial results are returned when it runs
    /// out
    pub overall_timeout: Duration,
    /// TCP connect timeout per probed host/port pair
    pub probe_connect_timeout: Duration,
    /// How long to wait for the HTTP banner of an open port
    pub probe_read_timeout_ms: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            overall_timeout: Duration::from_secs(20),
            probe_connect_timeout: Duration::from_secs(2),
            probe_read_timeout_ms: 1000,
        }
    }
}

/// Checks whether an HTTP response body came from a GT100 web interface.
/// Case-insensitive substring match, so both the web UI greeting and the
/// terser firmware banners are accepted.
pub fn is_gt100_http_banner(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["godiag", "gt100", "gpt", "doip"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Removes duplicate discoveries. A device probed via two paths (say, the
/// web UI port and the DOIP port on the same box) is identified by its
/// `(name, port, ethernet_ip)` triple.
pub fn dedup_devices(devices: Vec<Gt100Device>) -> Vec<Gt100Device> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|d| seen.insert((d.name.clone(), d.port.clone(), d.ethernet_ip.clone())))
        .collect()
}

/// Runs a blocking scan with the given options
pub fn scan(options: &ScanOptions) -> Vec<Gt100Device> {
    scan_inner(options, &AtomicBool::new(false))
}

fn scan_inner(options: &ScanOptions, stop: &AtomicBool) -> Vec<Gt100Device> {
    let deadline = Instant::now() + options.overall_timeout;
    let mut devices = Vec::new();

    log::info!("Starting GT100 device scan...");
    if stop.load(Ordering::Relaxed) {
        return devices;
    }
    devices.extend(usb_probe());

    if Instant::now() >= deadline {
        log::warn!("GT100 scan timeout reached before ENET probe, returning partial results");
        return dedup_devices(devices);
    }
    devices.extend(enet_probe(options, deadline, stop));

    let devices = dedup_devices(devices);
    log::info!("GT100 scan finished, {} device(s) found", devices.len());
    devices
}

fn usb_probe() -> Vec<Gt100Device> {
    match usb::list_matching(GT100_USB_VID, GT100_USB_PID) {
        Ok(found) => found
            .iter()
            .map(|info| {
                let dev = Gt100Device::usb(info);
                log::info!("Found GT100 via USB: {:?}", dev.serial_number);
                dev
            })
            .collect(),
        Err(e) => {
            log::error!("GT100 USB probe failed: {e}");
            Vec::new()
        }
    }
}

fn enet_probe(options: &ScanOptions, deadline: Instant, stop: &AtomicBool) -> Vec<Gt100Device> {
    let mut devices = Vec::new();
    for subnet in ENET_SUBNETS {
        for host in 1u8..255 {
            if stop.load(Ordering::Relaxed) {
                log::info!("GT100 ENET probe stopped");
                return devices;
            }
            if Instant::now() >= deadline {
                log::warn!("GT100 scan timeout reached during ENET probe, returning partial results");
                return devices;
            }
            let ip = format!("{}.{}.{}.{}", subnet[0], subnet[1], subnet[2], host);
            for port in ENET_PORTS {
                if http_identify(&ip, port, options) {
                    log::info!("Found GT100 via DOIP: {ip}:{port}");
                    devices.push(Gt100Device::doip(&ip, port));
                    break; // One entry per host
                }
            }
        }
    }
    devices
}

/// Connects to `ip:port`, issues a plain HTTP GET and checks the reply for a
/// GT100 banner. Any connect or read failure just means "not a GT100 here".
fn http_identify(ip: &str, port: u16, options: &ScanOptions) -> bool {
    let Ok(mut transport) = TcpTransport::new(ip, port, options.probe_connect_timeout) else {
        return false;
    };
    if transport.open().is_err() {
        return false;
    }
    let request = format!("GET / HTTP/1.1\r\nHost: {ip}\r\nConnection: close\r\n\r\n");
    let identified = transport.send_bytes(request.as_bytes()).is_ok()
        && match transport.read_bytes(options.probe_read_timeout_ms) {
            Ok(body) => is_gt100_http_banner(&String::from_utf8_lossy(&body)),
            Err(_) => false,
        };
    let _ = transport.close();
    identified
}

/// Handle to a scan running on a worker thread.
///
/// The completed device list is delivered wholesale over a channel; there is
/// no per-device streaming.
#[derive(Debug)]
pub struct ScanHandle {
    stop: Arc<AtomicBool>,
    rx: mpsc::Receiver<Vec<Gt100Device>>,
    handle: Option<JoinHandle<()>>,
}

/// Spawns a scan on a worker thread
pub fn spawn_scan(options: ScanOptions) -> ScanHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let worker_stop = stop.clone();
    let handle = std::thread::spawn(move || {
        let devices = scan_inner(&options, &worker_stop);
        // Receiver may already be gone
        let _ = tx.send(devices);
    });
    ScanHandle {
        stop,
        rx,
        handle: Some(handle),
    }
}

impl ScanHandle {
    /// Returns the results if the scan has already finished
    pub fn try_results(&self) -> Option<Vec<Gt100Device>> {
        self.rx.try_recv().ok()
    }

    /// Blocks until the scan completes and returns its results
    pub fn wait(mut self) -> Vec<Gt100Device> {
        let devices = self.rx.recv().unwrap_or_default();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        devices
    }

    /// Requests the scan to stop and returns whatever it found so far. The
    /// worker reacts within one probe, so the join is bounded.
    pub fn cancel(mut self) -> Vec<Gt100Device> {
        self.stop.store(true, Ordering::Relaxed);
        let devices = self
            .rx
            .recv_timeout(Duration::from_secs(3))
            .unwrap_or_default();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        devices
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_banner_matching_is_case_insensitive() {
        assert!(is_gt100_http_banner("Welcome to GoDiag GT100 web UI"));
        assert!(is_gt100_http_banner("welcome to godiag gt100 web ui"));
        assert!(is_gt100_http_banner("HTTP/1.1 200 OK\r\n\r\nDOIP gateway"));
        assert!(is_gt100_http_banner("GPT programmer ready"));
        assert!(!is_gt100_http_banner("HTTP/1.1 200 OK\r\n\r\nhello world"));
        assert!(!is_gt100_http_banner(""));
    }

    #[test]
    fn dedup_keys_on_name_port_and_ip() {
        let devices = vec![
            Gt100Device::doip("192.168.1.50", 13400),
            Gt100Device::doip("192.168.1.50", 13400),
            Gt100Device::doip("192.168.1.50", 8080),
            Gt100Device::doip("192.168.1.51", 13400),
        ];
        let deduped = dedup_devices(devices);
        assert_eq!(deduped.len(), 3);
    }

    #[test]
    fn stopped_scan_returns_immediately() {
        let options = ScanOptions::default();
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        let devices = scan_inner(&options, &stop);
        assert!(devices.is_empty());
        assert!(started.elapsed() < options.overall_timeout);
    }

    #[test]
    fn exhausted_deadline_skips_the_enet_probe() {
        // Zero budget: the USB probe still runs, the network is never touched
        let options = ScanOptions {
            overall_timeout: Duration::ZERO,
            ..ScanOptions::default()
        };
        let started = Instant::now();
        let _ = scan(&options);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancelled_worker_delivers_partial_results() {
        let options = ScanOptions {
            overall_timeout: Duration::from_secs(1),
            ..ScanOptions::default()
        };
        let started = Instant::now();
        let handle = spawn_scan(options);
        let _devices = handle.cancel();
        // The point is a bounded, clean stop, not what the LAN contains
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
