//! Exactly-once ownership of native handles
//!
//! Every wrapper holds its native handle inside an [`Owned`]. The handle is
//! released when the owner is dropped or explicitly closed, never both and
//! never twice: [`Owned::close`] consumes the value, and `Drop` only runs
//! the release for handles that are still live.

use pinion_hal::Hal;

use crate::error::{check, Error, Peripheral, Result};

/// Native close/destroy function for one resource family
pub(crate) type Release<H> = fn(&H, <H as Hal>::Handle) -> i32;

/// A live native handle together with the HAL that issued it
pub struct Owned<H: Hal> {
    hal: H,
    raw: H::Handle,
    kind: Peripheral,
    release: Release<H>,
    live: bool,
}

impl<H: Hal> Owned<H> {
    pub(crate) fn new(hal: H, raw: H::Handle, kind: Peripheral, release: Release<H>) -> Self {
        Self {
            hal,
            raw,
            kind,
            release,
            live: true,
        }
    }

    /// The HAL this handle belongs to
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// The raw native handle
    pub fn raw(&self) -> H::Handle {
        self.raw
    }

    /// Resource family
    pub fn kind(&self) -> Peripheral {
        self.kind
    }

    /// Release the handle now and report the native result
    pub fn close(mut self) -> Result<()> {
        self.live = false;
        debug!("closing {:?}", self.kind);
        check((self.release)(&self.hal, self.raw)).map(|_| ())
    }
}

impl<H: Hal> Drop for Owned<H> {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        debug!("closing {:?}", self.kind);
        let ret = (self.release)(&self.hal, self.raw);
        if ret < 0 {
            warn!("close of {:?} failed: {}", self.kind, ret);
        }
    }
}

impl<H: Hal> core::fmt::Debug for Owned<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Owned")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .finish()
    }
}

/// Open a numbered peripheral
///
/// Rejects ids beyond the reported device count without calling the
/// native open, and turns a missing handle into [`Error::OpenFailed`].
pub(crate) fn open_device<H: Hal>(
    hal: &H,
    kind: Peripheral,
    id: u8,
    count: u32,
    open: impl FnOnce(&H) -> Option<H::Handle>,
    release: Release<H>,
) -> Result<Owned<H>> {
    if u32::from(id) >= count {
        warn!("{:?} {} does not exist ({} devices)", kind, id, count);
        return Err(Error::NoSuchDevice { kind, id });
    }
    match open(hal) {
        Some(raw) => {
            debug!("opened {:?} {}", kind, id);
            Ok(Owned::new(hal.clone(), raw, kind, release))
        }
        None => {
            warn!("open of {:?} {} failed", kind, id);
            Err(Error::OpenFailed { kind, id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_hal::gpio::{Direction, PinMode};
    use pinion_hal::{Errno, GpioHal};
    use pinion_hal_sim::{Peripheral as SimPeripheral, SimHal};

    fn open_pin(sim: &SimHal, id: u8) -> Result<Owned<SimHal>> {
        open_device(
            sim,
            Peripheral::Gpio,
            id,
            sim.gpio_device_count(),
            |hal| hal.gpio_open(id, Direction::Output, PinMode::PullUp),
            SimHal::gpio_close,
        )
    }

    #[test]
    fn test_drop_releases_once() {
        let sim = SimHal::new();
        let pin = open_pin(&sim, 0).unwrap();
        drop(pin);
        assert_eq!(sim.calls("gpio_close"), 1);
        assert_eq!(sim.open_handles(), 0);
        assert_eq!(sim.bad_handle_uses(), 0);
    }

    #[test]
    fn test_close_then_no_drop_release() {
        let sim = SimHal::new();
        let pin = open_pin(&sim, 0).unwrap();
        assert_eq!(pin.close(), Ok(()));
        assert_eq!(sim.calls("gpio_close"), 1);
    }

    #[test]
    fn test_close_failure_still_single_call() {
        let sim = SimHal::new();
        let pin = open_pin(&sim, 1).unwrap();
        sim.fail_next("gpio_close", Errno::EBUSY);
        assert_eq!(pin.close(), Err(Error::Hal(Errno::EBUSY)));
        assert_eq!(sim.calls("gpio_close"), 1);
    }

    #[test]
    fn test_id_beyond_count_never_opens() {
        let sim = SimHal::new();
        sim.set_device_count(SimPeripheral::Gpio, 2);
        assert_eq!(
            open_pin(&sim, 2).unwrap_err(),
            Error::NoSuchDevice {
                kind: Peripheral::Gpio,
                id: 2
            }
        );
        assert_eq!(sim.calls("gpio_open"), 0);
    }

    #[test]
    fn test_open_failure_typed() {
        let sim = SimHal::new();
        sim.fail_next("gpio_open", Errno::ENOMEM);
        assert_eq!(
            open_pin(&sim, 0).unwrap_err(),
            Error::OpenFailed {
                kind: Peripheral::Gpio,
                id: 0
            }
        );
    }
}
