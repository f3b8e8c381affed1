//! Scripted passthru device for unit testing and demo sessions
//!
//! Works like a simulation channel: requests are matched against a
//! request/response map and hits are queued for the next read. With
//! [MockPassthru::with_uds_demo_responses] it answers the three UDS services
//! the session layer issues, which is enough to drive a full demo session
//! without hardware.

use std::collections::{HashMap, VecDeque};

use super::{
    ChannelId, PassthruDevice, PassthruError, PassthruMessage, PassthruProtocol, PassthruResult,
};

/// Mock passthru device
#[derive(Debug, Clone, Default)]
pub struct MockPassthru {
    is_open: bool,
    channels: HashMap<ChannelId, PassthruProtocol>,
    next_channel_id: ChannelId,
    responses: HashMap<Vec<u8>, Vec<u8>>,
    rx_queue: VecDeque<Vec<u8>>,
    /// Requests seen, for assertions in tests
    pub sent: Vec<Vec<u8>>,
}

impl MockPassthru {
    /// Creates an empty mock with no scripted responses
    pub fn new() -> Self {
        Self {
            next_channel_id: 1,
            ..Default::default()
        }
    }

    /// Creates a mock pre-loaded with positive responses for VIN read, DTC
    /// scan and DTC clear, mirroring a well-behaved demo ECU
    pub fn with_uds_demo_responses() -> Self {
        let mut mock = Self::new();
        let mut vin_response = vec![0x62, 0xF1, 0x90];
        vin_response.extend_from_slice(b"WVWZZZ3CZ7E123456");
        mock.add_response(&[0x22, 0xF1, 0x90], &vin_response);
        mock.add_response(
            &[0x19, 0x01],
            &[0x59, 0x01, 0x03, 0x00, 0x00, 0x08, 0x03, 0x01, 0x00, 0x08],
        );
        mock.add_response(&[0x14, 0xFF, 0xFF, 0xFF], &[0x54]);
        mock
    }

    /// Scripts the response for an exact request payload
    pub fn add_response(&mut self, request: &[u8], response: &[u8]) {
        self.responses.insert(request.to_vec(), response.to_vec());
    }

    /// Clears scripted responses and any queued data
    pub fn clear_map(&mut self) {
        self.responses.clear();
        self.rx_queue.clear();
    }

    fn check_channel(&self, channel_id: ChannelId) -> PassthruResult<PassthruProtocol> {
        self.channels
            .get(&channel_id)
            .copied()
            .ok_or(PassthruError::InvalidChannel(channel_id))
    }
}

impl PassthruDevice for MockPassthru {
    fn open(&mut self) -> PassthruResult<()> {
        self.is_open = true;
        Ok(())
    }

    fn close(&mut self) -> PassthruResult<()> {
        self.is_open = false;
        self.channels.clear();
        self.rx_queue.clear();
        Ok(())
    }

    fn connect(&mut self, protocol: PassthruProtocol, _flags: u16) -> PassthruResult<ChannelId> {
        if !self.is_open {
            return Err(PassthruError::DeviceNotOpen);
        }
        let channel_id = self.next_channel_id;
        self.next_channel_id += 1;
        self.channels.insert(channel_id, protocol);
        Ok(channel_id)
    }

    fn disconnect(&mut self, channel_id: ChannelId) -> PassthruResult<()> {
        self.channels.remove(&channel_id);
        Ok(())
    }

    fn send_message(&mut self, channel_id: ChannelId, msg: &PassthruMessage) -> PassthruResult<()> {
        self.check_channel(channel_id)?;
        self.sent.push(msg.data.clone());
        if let Some(response) = self.responses.get(&msg.data) {
            self.rx_queue.push_back(response.clone());
        }
        Ok(())
    }

    fn read_message(
        &mut self,
        channel_id: ChannelId,
        _timeout_ms: u32,
    ) -> PassthruResult<Option<PassthruMessage>> {
        let protocol = self.check_channel(channel_id)?;
        Ok(self
            .rx_queue
            .pop_front()
            .map(|data| PassthruMessage::new(protocol, &data)))
    }

    fn is_connected(&self) -> bool {
        !self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_monotonic_and_never_reused() {
        let mut mock = MockPassthru::new();
        mock.open().unwrap();
        let a = mock.connect(PassthruProtocol::Iso14229Uds, 0).unwrap();
        mock.disconnect(a).unwrap();
        let b = mock.connect(PassthruProtocol::Iso14229Uds, 0).unwrap();
        assert!(b > a);
        // Stale handle no longer routes anywhere
        let msg = PassthruMessage::new(PassthruProtocol::Iso14229Uds, &[0x3E, 0x00]);
        assert!(matches!(
            mock.send_message(a, &msg),
            Err(PassthruError::InvalidChannel(_))
        ));
    }

    #[test]
    fn connect_requires_open() {
        let mut mock = MockPassthru::new();
        assert!(matches!(
            mock.connect(PassthruProtocol::Iso14229Uds, 0),
            Err(PassthruError::DeviceNotOpen)
        ));
    }

    #[test]
    fn scripted_request_response() {
        let mut mock = MockPassthru::with_uds_demo_responses();
        mock.open().unwrap();
        let ch = mock.connect(PassthruProtocol::Iso14229Uds, 0).unwrap();
        let req = PassthruMessage::new(PassthruProtocol::Iso14229Uds, &[0x22, 0xF1, 0x90]);
        mock.send_message(ch, &req).unwrap();
        let resp = mock.read_message(ch, 100).unwrap().unwrap();
        assert_eq!(resp.data[0], 0x62);
        assert_eq!(&resp.data[3..], b"WVWZZZ3CZ7E123456");
    }

    #[test]
    fn unscripted_request_reads_none() {
        let mut mock = MockPassthru::new();
        mock.open().unwrap();
        let ch = mock.connect(PassthruProtocol::Iso14229Uds, 0).unwrap();
        let req = PassthruMessage::new(PassthruProtocol::Iso14229Uds, &[0x10, 0x03]);
        mock.send_message(ch, &req).unwrap();
        assert!(mock.read_message(ch, 100).unwrap().is_none());
    }
}
