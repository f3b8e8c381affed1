//! USB bulk transport over `nusb`
//!
//! GoDiag VCI hardware enumerates as a vendor-specific device with one bulk
//! IN and one bulk OUT endpoint on interface 0.

use std::io::{Read, Write};

use nusb::{
    Interface, MaybeFuture,
    transfer::{Bulk, In, Out},
};

use crate::channel::{ChannelError, ChannelResult, Transport};

/// Identification details of one enumerated USB device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    /// Platform bus identifier
    pub bus_id: String,
    /// Address on the bus
    pub address: u8,
    /// Serial number string descriptor, if the device reports one
    pub serial_number: Option<String>,
    /// Product string descriptor, if the device reports one
    pub product: Option<String>,
}

/// Lists all connected USB devices matching the vendor/product pair
pub fn list_matching(vid: u16, pid: u16) -> ChannelResult<Vec<UsbDeviceInfo>> {
    let devices = nusb::list_devices().wait().map_err(nusb_error)?;
    Ok(devices
        .filter(|d| d.vendor_id() == vid && d.product_id() == pid)
        .map(|d| UsbDeviceInfo {
            bus_id: d.bus_id().to_string(),
            address: d.device_address(),
            serial_number: d.serial_number().map(String::from),
            product: d.product_string().map(String::from),
        })
        .collect())
}

/// USB bulk transport
pub struct UsbTransport {
    vid: u16,
    pid: u16,
    interface: Option<Interface>,
    in_endpoint: u8,
    out_endpoint: u8,
}

impl std::fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UsbTransport {:04X}:{:04X}", self.vid, self.pid)
    }
}

impl UsbTransport {
    /// Creates a transport for the first device matching `vid`/`pid`. The
    /// device is not opened until [Transport::open] is called.
    pub fn new(vid: u16, pid: u16) -> Self {
        Self {
            vid,
            pid,
            interface: None,
            in_endpoint: 0,
            out_endpoint: 0,
        }
    }
}

fn nusb_error(e: impl std::fmt::Display) -> ChannelError {
    ChannelError::APIError {
        api_name: "nusb".into(),
        desc: e.to_string(),
    }
}

impl Transport for UsbTransport {
    fn open(&mut self) -> ChannelResult<()> {
        if self.interface.is_some() {
            return Ok(());
        }
        let info = nusb::list_devices()
            .wait()
            .map_err(nusb_error)?
            .find(|d| d.vendor_id() == self.vid && d.product_id() == self.pid)
            .ok_or_else(|| nusb_error("device not found"))?;
        let device = info.open().wait().map_err(nusb_error)?;
        let interface = device.claim_interface(0).wait().map_err(nusb_error)?;

        let mut in_ep = 0u8;
        let mut out_ep = 0u8;
        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != 0 {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                            if ep.direction() == nusb::transfer::Direction::In {
                                in_ep = ep.address();
                            } else {
                                out_ep = ep.address();
                            }
                        }
                    }
                }
            }
        }
        if in_ep == 0 || out_ep == 0 {
            return Err(nusb_error("no bulk endpoint pair on interface 0"));
        }

        log::debug!(
            "USB device {:04X}:{:04X} opened (IN 0x{:02X}, OUT 0x{:02X})",
            self.vid,
            self.pid,
            in_ep,
            out_ep
        );
        self.interface = Some(interface);
        self.in_endpoint = in_ep;
        self.out_endpoint = out_ep;
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        // Dropping the interface releases the claim
        self.interface = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    fn send_bytes(&mut self, buffer: &[u8]) -> ChannelResult<()> {
        let interface = self.interface.as_ref().ok_or(ChannelError::InterfaceNotOpen)?;
        let ep = interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(nusb_error)?;
        let mut writer = ep.writer(4096);
        writer.write_all(buffer).map_err(|e| nusb_error(e))?;
        writer.flush().map_err(|e| nusb_error(e))?;
        Ok(())
    }

    fn read_bytes(&mut self, _timeout_ms: u32) -> ChannelResult<Vec<u8>> {
        let interface = self.interface.as_ref().ok_or(ChannelError::InterfaceNotOpen)?;
        let ep = interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(nusb_error)?;
        let mut reader = ep.reader(4096);
        let mut buf = vec![0u8; 512];
        let n = reader.read(&mut buf).map_err(|e| nusb_error(e))?;
        if n == 0 {
            return Err(ChannelError::ReadTimeout);
        }
        buf.truncate(n);
        Ok(buf)
    }
}
