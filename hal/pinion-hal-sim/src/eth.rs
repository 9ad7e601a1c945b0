//! Simulated Ethernet tap
//!
//! Records what the wrapper hands to the stack and lets tests play the
//! stack's side by calling the registered transmit function.

use pinion_hal::eth::{
    EthHal, EthTransmit, EVENT_IFACE_DISCONNECTED, EVENT_IFACE_UP,
};
use pinion_hal::Errno;

use crate::{enter, SimHal};

/// Largest frame accepted by `eth_rx`
pub const MAX_FRAME_LEN: usize = 1518;

#[derive(Default)]
pub(crate) struct EthState {
    mac: Option<[u8; 6]>,
    tx: Option<EthTransmit>,
    received: Vec<Vec<u8>>,
    events: Vec<(i32, Vec<u8>)>,
}

impl EthHal for SimHal {
    fn eth_setup_mac(&self, mac: &[u8; 6]) -> i32 {
        let mut s = self.lock();
        enter!(s, "eth_setup_mac");
        s.eth.mac = Some(*mac);
        0
    }

    fn eth_tx_register(&self, send: EthTransmit) -> i32 {
        let mut s = self.lock();
        enter!(s, "eth_tx_register");
        s.eth.tx = Some(send);
        0
    }

    fn eth_rx(&self, frame: &[u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "eth_rx");
        if frame.is_empty() {
            return Errno::EINVAL.as_ret();
        }
        if frame.len() > MAX_FRAME_LEN {
            return Errno::E2BIG.as_ret();
        }
        s.eth.received.push(frame.to_vec());
        0
    }

    fn eth_event_send(&self, event: i32, data: &[u8], _timeout: i32) -> i32 {
        let mut s = self.lock();
        enter!(s, "eth_event_send");
        if !(EVENT_IFACE_UP..=EVENT_IFACE_DISCONNECTED).contains(&event) {
            return Errno::EINVAL.as_ret();
        }
        s.eth.events.push((event, data.to_vec()));
        0
    }
}

impl SimHal {
    /// Play the stack sending `frame` through the registered transmit
    /// function
    ///
    /// Returns `None` when nothing is registered.
    pub fn eth_transmit(&self, frame: &mut [u8]) -> Option<i32> {
        let send = self.lock().eth.tx?;
        let len = i32::try_from(frame.len()).ok()?;
        // SAFETY: `frame` is valid for `len` bytes for the duration of the call.
        Some(unsafe { send(frame.as_mut_ptr(), len) })
    }

    /// MAC address programmed through `eth_setup_mac`
    pub fn eth_mac(&self) -> Option<[u8; 6]> {
        self.lock().eth.mac
    }

    /// Frames handed to the stack
    pub fn eth_received(&self) -> Vec<Vec<u8>> {
        self.lock().eth.received.clone()
    }

    /// Events posted to the stack
    pub fn eth_events(&self) -> Vec<(i32, Vec<u8>)> {
        self.lock().eth.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rx_bounds() {
        let sim = SimHal::new();
        assert_eq!(sim.eth_rx(&[]), Errno::EINVAL.as_ret());
        assert_eq!(sim.eth_rx(&[0; MAX_FRAME_LEN + 1]), Errno::E2BIG.as_ret());
        assert_eq!(sim.eth_rx(&[1, 2, 3]), 0);
        assert_eq!(sim.eth_received(), [vec![1, 2, 3]]);
        assert_eq!(sim.eth_event_send(7, &[], 0), Errno::EINVAL.as_ret());
    }
}
