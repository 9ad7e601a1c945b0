//! Raw Ethernet tap
//!
//! The network stack runs in the native layer. The application supplies a
//! transmit closure for outgoing frames and pushes received frames in with
//! [`Ethernet::receive`].
//!
//! The native transmit registration carries no context pointer, so the
//! closure lives in a single global slot. One [`Ethernet`] is live at a
//! time; creating another replaces the closure.

use alloc::boxed::Box;
use core::cell::RefCell;

use critical_section::Mutex;
use pinion_hal::eth::{
    EVENT_IFACE_CONNECTED, EVENT_IFACE_DISCONNECTED, EVENT_IFACE_DOWN, EVENT_IFACE_UP,
};
use pinion_hal::{Errno, EthHal, Timeout};

use crate::error::{check, Error, Invalid, Result};

/// Largest frame accepted by [`Ethernet::receive`]
pub const MAX_FRAME_LEN: usize = 1518;

type Transmit = Box<dyn FnMut(&mut [u8]) -> Result<usize> + Send>;

struct Slot {
    /// Bumped on every install and clear
    generation: u32,
    transmit: Option<Transmit>,
}

static TRANSMIT: Mutex<RefCell<Slot>> = Mutex::new(RefCell::new(Slot {
    generation: 0,
    transmit: None,
}));

/// Interface events understood by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkEvent {
    Up,
    Down,
    Connected,
    Disconnected,
}

impl LinkEvent {
    fn raw(self) -> i32 {
        match self {
            LinkEvent::Up => EVENT_IFACE_UP,
            LinkEvent::Down => EVENT_IFACE_DOWN,
            LinkEvent::Connected => EVENT_IFACE_CONNECTED,
            LinkEvent::Disconnected => EVENT_IFACE_DISCONNECTED,
        }
    }
}

pub struct Ethernet<H: EthHal> {
    hal: H,
    generation: u32,
}

impl<H: EthHal> Ethernet<H> {
    /// Program `mac` and route outgoing frames to `transmit`
    ///
    /// `transmit` returns the number of bytes put on the wire.
    pub fn new(
        hal: &H,
        mac: [u8; 6],
        transmit: impl FnMut(&mut [u8]) -> Result<usize> + Send + 'static,
    ) -> Result<Self> {
        check(hal.eth_setup_mac(&mac))?;
        let (generation, replaced) = critical_section::with(|cs| {
            let mut slot = TRANSMIT.borrow_ref_mut(cs);
            slot.generation = slot.generation.wrapping_add(1);
            let replaced = slot.transmit.replace(Box::new(transmit)).is_some();
            (slot.generation, replaced)
        });
        if replaced {
            warn!("replacing Ethernet transmit handler");
        }
        if let Err(e) = check(hal.eth_tx_register(transmit_trampoline)) {
            clear(generation);
            return Err(e);
        }
        debug!("Ethernet up");
        Ok(Self {
            hal: hal.clone(),
            generation,
        })
    }

    /// Hand a received frame to the stack
    pub fn receive(&self, frame: &[u8]) -> Result<()> {
        if frame.is_empty() || frame.len() > MAX_FRAME_LEN {
            warn!("dropping frame of {} bytes", frame.len());
            return Err(Error::InvalidArgument(Invalid::Frame));
        }
        check(self.hal.eth_rx(frame)).map(|_| ())
    }

    /// Post a link event with an optional payload
    pub fn send_event(&self, event: LinkEvent, data: &[u8], timeout: Timeout) -> Result<()> {
        check(
            self.hal
                .eth_event_send(event.raw(), data, timeout.as_raw()),
        )
        .map(|_| ())
    }
}

impl<H: EthHal> Drop for Ethernet<H> {
    fn drop(&mut self) {
        clear(self.generation);
    }
}

/// Empty the slot if it still holds the closure installed as `generation`
fn clear(generation: u32) {
    critical_section::with(|cs| {
        let mut slot = TRANSMIT.borrow_ref_mut(cs);
        if slot.generation == generation {
            slot.generation = slot.generation.wrapping_add(1);
            slot.transmit = None;
        }
    });
}

unsafe extern "C" fn transmit_trampoline(frame: *mut u8, len: i32) -> i32 {
    let Ok(len) = usize::try_from(len) else {
        return Errno::EINVAL.as_ret();
    };
    if frame.is_null() {
        return Errno::EINVAL.as_ret();
    }
    // SAFETY: the stack passes a frame buffer valid for `len` bytes that it
    // does not touch until this call returns.
    let frame = unsafe { core::slice::from_raw_parts_mut(frame, len) };

    // Run the closure outside the critical section and put it back unless
    // the slot changed hands meanwhile.
    let taken = critical_section::with(|cs| {
        let mut slot = TRANSMIT.borrow_ref_mut(cs);
        let generation = slot.generation;
        slot.transmit.take().map(|t| (generation, t))
    });
    let Some((generation, mut transmit)) = taken else {
        return Errno::ENODEV.as_ret();
    };
    let result = transmit(frame);
    critical_section::with(|cs| {
        let mut slot = TRANSMIT.borrow_ref_mut(cs);
        if slot.generation == generation && slot.transmit.is_none() {
            slot.transmit = Some(transmit);
        }
    });
    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => e.errno().as_ret(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec;
    use alloc::vec::Vec;
    use pinion_hal_sim::SimHal;
    use std::sync::Mutex as StdMutex;

    // The transmit slot is process-wide, so everything touching it lives in
    // this one test.
    #[test]
    fn test_ethernet_tap() {
        let sim = SimHal::new();
        assert_eq!(sim.eth_transmit(&mut [1, 2]), None);

        let sent = Arc::new(StdMutex::new(Vec::new()));
        let sink = sent.clone();
        let eth = Ethernet::new(&sim, [2, 0, 0, 0, 0, 1], move |frame: &mut [u8]| {
            sink.lock().unwrap().push(frame.to_vec());
            Ok(frame.len())
        })
        .unwrap();
        assert_eq!(sim.eth_mac(), Some([2, 0, 0, 0, 0, 1]));

        assert_eq!(sim.eth_transmit(&mut [0xAA, 0xBB, 0xCC]), Some(3));
        assert_eq!(*sent.lock().unwrap(), vec![vec![0xAA, 0xBB, 0xCC]]);

        eth.receive(&[9, 8, 7]).unwrap();
        assert_eq!(sim.eth_received(), vec![vec![9, 8, 7]]);
        assert_eq!(
            eth.receive(&[]),
            Err(Error::InvalidArgument(Invalid::Frame))
        );
        assert_eq!(
            eth.receive(&[0; MAX_FRAME_LEN + 1]),
            Err(Error::InvalidArgument(Invalid::Frame))
        );
        assert_eq!(sim.calls("eth_rx"), 1);

        eth.send_event(LinkEvent::Up, &[], Timeout::NoWait).unwrap();
        eth.send_event(LinkEvent::Connected, &[1], Timeout::Forever)
            .unwrap();
        assert_eq!(
            sim.eth_events(),
            vec![(EVENT_IFACE_UP, vec![]), (EVENT_IFACE_CONNECTED, vec![1])]
        );

        // A failing transmit reports its errno to the stack.
        let failing = Ethernet::new(&sim, [2, 0, 0, 0, 0, 2], |_: &mut [u8]| {
            Err(Error::Hal(Errno::EBUSY))
        })
        .unwrap();
        assert_eq!(sim.eth_transmit(&mut [1]), Some(Errno::EBUSY.as_ret()));

        // Dropping the replaced tap leaves the newer handler in place.
        drop(eth);
        assert_eq!(sim.eth_transmit(&mut [1]), Some(Errno::EBUSY.as_ret()));
        drop(failing);
        assert_eq!(sim.eth_transmit(&mut [1]), Some(Errno::ENODEV.as_ret()));
    }
}
