//! Raw Ethernet tap boundary
//!
//! The network stack lives in the native layer. Outgoing frames are handed
//! to a registered transmit function; incoming frames are pushed in with
//! `eth_rx`.

/// Interface came up
pub const EVENT_IFACE_UP: i32 = 0;
/// Interface went down
pub const EVENT_IFACE_DOWN: i32 = 1;
/// Link connected
pub const EVENT_IFACE_CONNECTED: i32 = 2;
/// Link disconnected
pub const EVENT_IFACE_DISCONNECTED: i32 = 3;

/// Transmit function called by the native stack with one frame
///
/// Returns the number of bytes sent or `-errno`.
pub type EthTransmit = unsafe extern "C" fn(frame: *mut u8, len: i32) -> i32;

/// Native Ethernet calls
pub trait EthHal: Clone {
    /// Program the interface MAC address
    fn eth_setup_mac(&self, mac: &[u8; 6]) -> i32;

    /// Register the transmit function
    fn eth_tx_register(&self, send: EthTransmit) -> i32;

    /// Hand a received frame to the stack
    fn eth_rx(&self, frame: &[u8]) -> i32;

    /// Post an interface event with optional payload
    fn eth_event_send(&self, event: i32, data: &[u8], timeout: i32) -> i32;
}
