//! I2S audio streams
//!
//! One I2S port carries a transmit and a receive stream. [`I2sPort`] opens
//! the port (or adopts a handle some other user already opened) and is
//! turned into an [`I2sOut`], an [`I2sIn`], or both. Streams of the same
//! port share its handle whether they came from one [`I2sPort::split`] or
//! from separate [`I2sOut::new`] and [`I2sIn::new`] calls; the handle is
//! closed when the last of them is dropped. A handle opened outside these
//! wrappers is used but never closed here.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;

use critical_section::Mutex;
use pinion_hal::i2s::{
    I2sDirection, RawI2sConfig, OPT_BIT_CLK_GATED, OPT_BIT_CLK_INV, OPT_BIT_CLK_SLAVE,
    OPT_DATA_ORDER_LSB, OPT_FRAME_CLK_INV, OPT_FRAME_CLK_SLAVE,
};
use pinion_hal::{Errno, I2sHal, Timeout};

pub use pinion_hal::i2s::{I2sMode, I2sState, I2sTrigger};

use crate::cache::Cached;
use crate::error::{check, check_len, span, Error, Invalid, Peripheral, Result};

/// Sample widths the controller supports
pub const SUPPORTED_SAMPLE_BITS: [u8; 4] = [8, 16, 24, 32];

/// Sample rates the controller supports
pub const SUPPORTED_SAMPLE_RATES: [u32; 12] = [
    8_000, 11_025, 12_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000, 96_000, 192_000,
    384_000,
];

/// Clock and data-order options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2sOptions {
    pub lsb_first: bool,
    pub bit_clock_inverted: bool,
    pub frame_clock_inverted: bool,
    /// Bit clock runs only while data is sent
    pub bit_clock_gated: bool,
    /// Bit clock driven by the remote side
    pub bit_clock_slave: bool,
    /// Frame clock driven by the remote side
    pub frame_clock_slave: bool,
}

impl I2sOptions {
    pub fn bits(&self) -> i32 {
        [
            (self.lsb_first, OPT_DATA_ORDER_LSB),
            (self.bit_clock_inverted, OPT_BIT_CLK_INV),
            (self.frame_clock_inverted, OPT_FRAME_CLK_INV),
            (self.bit_clock_gated, OPT_BIT_CLK_GATED),
            (self.bit_clock_slave, OPT_BIT_CLK_SLAVE),
            (self.frame_clock_slave, OPT_FRAME_CLK_SLAVE),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .fold(0, |acc, (_, bit)| acc | bit)
    }
}

/// Stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct I2sConfig {
    pub mode: I2sMode,
    pub sample_bits: u8,
    pub sample_rate: u32,
    /// 1 (mono) or 2 (stereo)
    pub channels: u8,
    pub options: I2sOptions,
    /// How long a block read or write may wait
    pub timeout: Timeout,
}

impl Default for I2sConfig {
    fn default() -> Self {
        Self {
            mode: I2sMode::Philips,
            sample_bits: 16,
            sample_rate: 16_000,
            channels: 2,
            options: I2sOptions::default(),
            timeout: Timeout::Forever,
        }
    }
}

impl I2sConfig {
    fn validate(&self) -> Result<()> {
        if !SUPPORTED_SAMPLE_BITS.contains(&self.sample_bits) {
            warn!("unsupported I2S sample width {}", self.sample_bits);
            return Err(Error::InvalidArgument(Invalid::SampleBits));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            warn!("unsupported I2S sample rate {}", self.sample_rate);
            return Err(Error::InvalidArgument(Invalid::SampleRate));
        }
        if !(1..=2).contains(&self.channels) {
            warn!("unsupported I2S channel count {}", self.channels);
            return Err(Error::InvalidArgument(Invalid::Channels));
        }
        Ok(())
    }

    fn raw(&self) -> RawI2sConfig {
        RawI2sConfig {
            mode: self.mode,
            options: self.options.bits(),
            channels: i32::from(self.channels),
            sample_bits: i32::from(self.sample_bits),
            sample_rate: i32::try_from(self.sample_rate).unwrap_or(i32::MAX),
            timeout: self.timeout.as_raw(),
        }
    }
}

/// Live users of every port handle opened by [`I2sPort::open`]
///
/// Entries are type-erased so one table serves every HAL.
static USERS: Mutex<RefCell<Vec<Box<dyn Any + Send>>>> = Mutex::new(RefCell::new(Vec::new()));

struct Users<R> {
    raw: R,
    count: usize,
}

fn users_of<R: Copy + Eq + Send + 'static>(
    table: &mut [Box<dyn Any + Send>],
    raw: R,
) -> Option<&mut Users<R>> {
    table
        .iter_mut()
        .filter_map(|entry| entry.downcast_mut::<Users<R>>())
        .find(|users| users.raw == raw)
}

/// One user of a port handle
///
/// The handle is closed when the last user of a handle opened here goes
/// away, no matter which wrapper opened it.
struct Port<H: I2sHal> {
    hal: H,
    raw: H::Handle,
    id: u8,
    // false when the handle was opened outside these wrappers
    counted: bool,
}

impl<H: I2sHal> Port<H> {
    fn open(hal: &H, id: u8) -> Result<Self> {
        let count = hal.i2s_device_count();
        if u32::from(id) >= count {
            warn!("I2S {} does not exist ({} devices)", id, count);
            return Err(Error::NoSuchDevice {
                kind: Peripheral::I2s,
                id,
            });
        }
        // Lookup and open happen under one lock so a concurrent last drop
        // cannot close the handle in between.
        critical_section::with(|cs| {
            let mut table = USERS.borrow_ref_mut(cs);
            if let Some(raw) = hal.i2s_handle_get(id) {
                let counted = match users_of(&mut table, raw) {
                    Some(users) => {
                        users.count += 1;
                        true
                    }
                    None => {
                        debug!("adopting I2S port {} opened elsewhere", id);
                        false
                    }
                };
                return Ok(Self {
                    hal: hal.clone(),
                    raw,
                    id,
                    counted,
                });
            }
            let raw = hal.i2s_open(id).ok_or_else(|| {
                warn!("opening I2S {} failed", id);
                Error::OpenFailed {
                    kind: Peripheral::I2s,
                    id,
                }
            })?;
            table.push(Box::new(Users { raw, count: 1 }));
            debug!("opened I2S {}", id);
            Ok(Self {
                hal: hal.clone(),
                raw,
                id,
                counted: true,
            })
        })
    }

    /// Another user of the same handle
    fn share(&self) -> Self {
        if self.counted {
            critical_section::with(|cs| {
                if let Some(users) = users_of(&mut USERS.borrow_ref_mut(cs), self.raw) {
                    users.count += 1;
                }
            });
        }
        Self {
            hal: self.hal.clone(),
            raw: self.raw,
            id: self.id,
            counted: self.counted,
        }
    }
}

impl<H: I2sHal> Drop for Port<H> {
    fn drop(&mut self) {
        if !self.counted {
            return;
        }
        let ret = critical_section::with(|cs| {
            let mut table = USERS.borrow_ref_mut(cs);
            let users = users_of(&mut table, self.raw)?;
            users.count -= 1;
            if users.count > 0 {
                return None;
            }
            let raw = self.raw;
            table.retain(|entry| {
                entry
                    .downcast_ref::<Users<H::Handle>>()
                    .map_or(true, |users| users.raw != raw)
            });
            Some(self.hal.i2s_close(raw))
        });
        match ret {
            Some(ret) if ret < 0 => warn!("closing I2S {} failed: {}", self.id, ret),
            Some(_) => debug!("closed I2S {}", self.id),
            None => {}
        }
    }
}

/// An open I2S port, not yet bound to a direction
pub struct I2sPort<H: I2sHal> {
    port: Port<H>,
}

impl<H: I2sHal> I2sPort<H> {
    /// Reuse the handle of an already open port `id`, or open it
    pub fn open(hal: &H, id: u8) -> Result<Self> {
        Ok(Self {
            port: Port::open(hal, id)?,
        })
    }

    pub fn id(&self) -> u8 {
        self.port.id
    }

    /// Whether dropping the last user closes the native handle
    pub fn owns_handle(&self) -> bool {
        self.port.counted
    }

    pub fn into_output(self, config: I2sConfig) -> Result<I2sOut<H>> {
        Ok(I2sOut {
            stream: Stream::new(self.port, I2sDirection::Tx, config)?,
        })
    }

    pub fn into_input(self, config: I2sConfig) -> Result<I2sIn<H>> {
        Ok(I2sIn {
            stream: Stream::new(self.port, I2sDirection::Rx, config)?,
        })
    }

    /// Use both directions of the port
    pub fn split(self, tx: I2sConfig, rx: I2sConfig) -> Result<(I2sOut<H>, I2sIn<H>)> {
        let out = I2sOut {
            stream: Stream::new(self.port.share(), I2sDirection::Tx, tx)?,
        };
        let input = I2sIn {
            stream: Stream::new(self.port, I2sDirection::Rx, rx)?,
        };
        Ok((out, input))
    }
}

struct Stream<H: I2sHal> {
    port: Port<H>,
    dir: I2sDirection,
    config: Cached<I2sConfig>,
    running: bool,
}

impl<H: I2sHal> Stream<H> {
    fn new(port: Port<H>, dir: I2sDirection, config: I2sConfig) -> Result<Self> {
        config.validate()?;
        check(port.hal.i2s_configure(port.raw, dir, &config.raw()))?;
        Ok(Self {
            port,
            dir,
            config: Cached::new(config),
            running: false,
        })
    }

    fn set_config(&mut self, config: I2sConfig) -> Result<()> {
        config.validate()?;
        let (port, dir) = (&self.port, self.dir);
        self.config.update(config, |c| {
            check(port.hal.i2s_configure(port.raw, dir, &c.raw())).map(|_| ())
        })
    }

    fn trigger(&mut self, cmd: I2sTrigger) -> Result<()> {
        check(self.port.hal.i2s_trigger(self.port.raw, self.dir, cmd))?;
        self.running = match cmd {
            I2sTrigger::Start => true,
            I2sTrigger::Stop | I2sTrigger::Drain | I2sTrigger::Drop => false,
            I2sTrigger::Prepare => self.running,
        };
        Ok(())
    }

    fn state(&self) -> Result<I2sState> {
        let raw = check(self.port.hal.i2s_status(self.port.raw, self.dir))?;
        I2sState::from_raw(raw).ok_or(Error::Hal(Errno::EIO))
    }
}

impl<H: I2sHal> Drop for Stream<H> {
    fn drop(&mut self) {
        if self.running {
            let ret = self
                .port
                .hal
                .i2s_trigger(self.port.raw, self.dir, I2sTrigger::Drop);
            if ret < 0 {
                warn!("stopping I2S {} failed: {}", self.port.id, ret);
            }
        }
    }
}

macro_rules! stream_controls {
    ($name:ident) => {
        impl<H: I2sHal> $name<H> {
            pub fn id(&self) -> u8 {
                self.stream.port.id
            }

            pub fn config(&self) -> I2sConfig {
                self.stream.config.get()
            }

            /// Apply a new format; the stream must not be running
            pub fn set_config(&mut self, config: I2sConfig) -> Result<()> {
                self.stream.set_config(config)
            }

            pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
                self.set_config(I2sConfig {
                    sample_rate,
                    ..self.config()
                })
            }

            pub fn set_sample_bits(&mut self, sample_bits: u8) -> Result<()> {
                self.set_config(I2sConfig {
                    sample_bits,
                    ..self.config()
                })
            }

            pub fn set_mode(&mut self, mode: I2sMode) -> Result<()> {
                self.set_config(I2sConfig {
                    mode,
                    ..self.config()
                })
            }

            pub fn set_channels(&mut self, channels: u8) -> Result<()> {
                self.set_config(I2sConfig {
                    channels,
                    ..self.config()
                })
            }

            pub fn trigger(&mut self, cmd: I2sTrigger) -> Result<()> {
                self.stream.trigger(cmd)
            }

            pub fn start(&mut self) -> Result<()> {
                self.trigger(I2sTrigger::Start)
            }

            /// Stop after the current block
            pub fn stop(&mut self) -> Result<()> {
                self.trigger(I2sTrigger::Stop)
            }

            /// Stop at once and discard queued blocks
            pub fn discard(&mut self) -> Result<()> {
                self.trigger(I2sTrigger::Drop)
            }

            /// Recover from an underrun or overrun
            pub fn prepare(&mut self) -> Result<()> {
                self.trigger(I2sTrigger::Prepare)
            }

            pub fn state(&self) -> Result<I2sState> {
                self.stream.state()
            }
        }
    };
}

/// Transmit stream
pub struct I2sOut<H: I2sHal> {
    stream: Stream<H>,
}

stream_controls!(I2sOut);

impl<H: I2sHal> I2sOut<H> {
    /// Open port `id` for playback
    pub fn new(hal: &H, id: u8, config: I2sConfig) -> Result<Self> {
        I2sPort::open(hal, id)?.into_output(config)
    }

    /// Send everything queued, then stop
    pub fn drain(&mut self) -> Result<()> {
        self.trigger(I2sTrigger::Drain)
    }

    /// Queue `data[..count]` for playback
    pub fn write(&mut self, data: &[u8], count: Option<usize>) -> Result<usize> {
        let n = span(data.len(), count)?;
        let port = &self.stream.port;
        check_len(port.hal.i2s_write(port.raw, &data[..n]))
    }
}

/// Receive stream
pub struct I2sIn<H: I2sHal> {
    stream: Stream<H>,
}

stream_controls!(I2sIn);

impl<H: I2sHal> I2sIn<H> {
    /// Open port `id` for capture
    pub fn new(hal: &H, id: u8, config: I2sConfig) -> Result<Self> {
        I2sPort::open(hal, id)?.into_input(config)
    }

    /// Read captured samples into `buf[..count]`, waiting up to the
    /// configured timeout
    pub fn read(&mut self, buf: &mut [u8], count: Option<usize>) -> Result<usize> {
        let n = span(buf.len(), count)?;
        let timeout = self.stream.config.get().timeout.as_raw();
        let port = &self.stream.port;
        check_len(port.hal.i2s_read(port.raw, &mut buf[..n], timeout))
    }
}
