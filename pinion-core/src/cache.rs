//! Configuration cache with rollback
//!
//! A wrapper keeps the last configuration it successfully pushed to the
//! hardware. Updates are optimistic: the new value is cached, serialized and
//! pushed, and the previous value is restored if the push fails.

use crate::error::Result;

/// Cached copy of a peripheral configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cached<C: Copy> {
    value: C,
}

impl<C: Copy> Cached<C> {
    pub fn new(value: C) -> Self {
        Self { value }
    }

    /// Last value known to be in the hardware
    pub fn get(&self) -> C {
        self.value
    }

    /// Replace the cached value and push it
    ///
    /// `push` sees the new value already in place. On failure the previous
    /// value is restored and the push error is returned unchanged.
    pub fn update(&mut self, value: C, push: impl FnOnce(&C) -> Result<()>) -> Result<()> {
        let old = core::mem::replace(&mut self.value, value);
        match push(&self.value) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("reconfigure failed, keeping previous settings: {:?}", e);
                self.value = old;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pinion_hal::Errno;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Settings {
        speed: u32,
        flag: bool,
    }

    #[test]
    fn test_update_keeps_value_on_success() {
        let mut cache = Cached::new(Settings { speed: 1, flag: false });
        let mut pushed = None;
        cache
            .update(Settings { speed: 2, flag: true }, |c| {
                pushed = Some(*c);
                Ok(())
            })
            .unwrap();
        assert_eq!(pushed, Some(Settings { speed: 2, flag: true }));
        assert_eq!(cache.get(), Settings { speed: 2, flag: true });
    }

    #[test]
    fn test_update_rolls_back_on_failure() {
        let mut cache = Cached::new(Settings { speed: 1, flag: false });
        let err = cache.update(Settings { speed: 9, flag: true }, |_| {
            Err(Error::Hal(Errno::EIO))
        });
        assert_eq!(err, Err(Error::Hal(Errno::EIO)));
        assert_eq!(cache.get(), Settings { speed: 1, flag: false });
    }
}
