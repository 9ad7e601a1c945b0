//! Simulated I2S ports
//!
//! Each direction walks the stream state machine: configuring makes it
//! ready, `Start` runs it, `Stop`/`Drain`/`Drop` bring it back to ready and
//! `Prepare` recovers it from the error state.

use std::collections::{HashMap, VecDeque};

use pinion_hal::i2s::{I2sDirection, I2sHal, I2sState, I2sTrigger, RawI2sConfig};
use pinion_hal::Errno;

use crate::{enter, Peripheral, SimHal, SimHandle};

#[derive(Clone, Copy)]
struct Stream {
    config: Option<RawI2sConfig>,
    state: I2sState,
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            config: None,
            state: I2sState::NotReady,
        }
    }
}

impl Stream {
    fn trigger(&self, cmd: I2sTrigger) -> Option<I2sState> {
        match (cmd, self.state) {
            (I2sTrigger::Start, I2sState::Ready) => Some(I2sState::Running),
            (I2sTrigger::Stop | I2sTrigger::Drain, I2sState::Running) => Some(I2sState::Ready),
            (I2sTrigger::Drop, s) if s != I2sState::NotReady => Some(I2sState::Ready),
            (I2sTrigger::Prepare, I2sState::Error) => Some(I2sState::Ready),
            _ => None,
        }
    }
}

struct Port {
    id: u8,
    rx: Stream,
    tx: Stream,
    written: Vec<u8>,
    captured: VecDeque<u8>,
}

impl Port {
    fn streams(&mut self, dir: I2sDirection) -> Vec<&mut Stream> {
        match dir {
            I2sDirection::Rx => vec![&mut self.rx],
            I2sDirection::Tx => vec![&mut self.tx],
            I2sDirection::Both => vec![&mut self.rx, &mut self.tx],
        }
    }
}

#[derive(Default)]
pub(crate) struct I2sBank {
    ports: HashMap<SimHandle, Port>,
}

impl I2sBank {
    pub(crate) fn len(&self) -> usize {
        self.ports.len()
    }

    fn by_id(&mut self, id: u8) -> Option<(SimHandle, &mut Port)> {
        self.ports
            .iter_mut()
            .find(|(_, p)| p.id == id)
            .map(|(h, p)| (*h, p))
    }
}

macro_rules! port {
    ($state:expr, $handle:expr) => {
        match $state.i2s.ports.get_mut(&$handle) {
            Some(p) => p,
            None => return $state.bad_handle(),
        }
    };
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

impl I2sHal for SimHal {
    fn i2s_device_count(&self) -> u32 {
        self.lock().device_count(Peripheral::I2s)
    }

    fn i2s_handle_get(&self, id: u8) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "i2s_handle_get", None);
        s.i2s.by_id(id).map(|(h, _)| h)
    }

    fn i2s_open(&self, id: u8) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "i2s_open", None);
        if !s.has_device(Peripheral::I2s, id) || s.i2s.by_id(id).is_some() {
            return None;
        }
        let handle = s.alloc();
        s.i2s.ports.insert(
            handle,
            Port {
                id,
                rx: Stream::default(),
                tx: Stream::default(),
                written: Vec::new(),
                captured: VecDeque::new(),
            },
        );
        Some(handle)
    }

    fn i2s_close(&self, i2s: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2s_close");
        match s.i2s.ports.remove(&i2s) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn i2s_configure(&self, i2s: SimHandle, dir: I2sDirection, config: &RawI2sConfig) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2s_configure");
        let port = port!(s, i2s);
        let mut streams = port.streams(dir);
        if streams.iter().any(|st| st.state == I2sState::Running) {
            return Errno::EBUSY.as_ret();
        }
        for st in streams.iter_mut() {
            st.config = Some(*config);
            st.state = I2sState::Ready;
        }
        0
    }

    fn i2s_trigger(&self, i2s: SimHandle, dir: I2sDirection, cmd: I2sTrigger) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2s_trigger");
        let port = port!(s, i2s);
        let mut streams = port.streams(dir);
        let next: Option<Vec<I2sState>> = streams.iter().map(|st| st.trigger(cmd)).collect();
        let Some(next) = next else {
            return Errno::EIO.as_ret();
        };
        for (st, state) in streams.iter_mut().zip(next) {
            st.state = state;
        }
        0
    }

    fn i2s_status(&self, i2s: SimHandle, dir: I2sDirection) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2s_status");
        let port = port!(s, i2s);
        match dir {
            I2sDirection::Rx => port.rx.state.as_raw(),
            I2sDirection::Tx => port.tx.state.as_raw(),
            I2sDirection::Both => Errno::EINVAL.as_ret(),
        }
    }

    fn i2s_write(&self, i2s: SimHandle, data: &[u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2s_write");
        let port = port!(s, i2s);
        if !matches!(port.tx.state, I2sState::Ready | I2sState::Running) {
            return Errno::EIO.as_ret();
        }
        port.written.extend_from_slice(data);
        count(data.len())
    }

    fn i2s_read(&self, i2s: SimHandle, buf: &mut [u8], _timeout: i32) -> i32 {
        let mut s = self.lock();
        enter!(s, "i2s_read");
        let port = port!(s, i2s);
        if port.rx.state != I2sState::Running {
            return Errno::EIO.as_ret();
        }
        let n = buf.len().min(port.captured.len());
        for (dst, src) in buf.iter_mut().zip(port.captured.drain(..n)) {
            *dst = src;
        }
        count(n)
    }
}

impl SimHal {
    /// Deliver captured samples to port `id`
    pub fn i2s_feed(&self, id: u8, data: &[u8]) {
        if let Some((_, port)) = self.lock().i2s.by_id(id) {
            port.captured.extend(data.iter().copied());
        }
    }

    /// Everything played on port `id`
    pub fn i2s_written(&self, id: u8) -> Vec<u8> {
        self.lock()
            .i2s
            .by_id(id)
            .map(|(_, p)| p.written.clone())
            .unwrap_or_default()
    }

    /// Configuration applied to one direction of port `id`
    pub fn i2s_config(&self, id: u8, dir: I2sDirection) -> Option<RawI2sConfig> {
        let mut s = self.lock();
        let (_, port) = s.i2s.by_id(id)?;
        match dir {
            I2sDirection::Rx => port.rx.config,
            I2sDirection::Tx => port.tx.config,
            I2sDirection::Both => None,
        }
    }

    /// Push one direction of port `id` into the error state
    pub fn i2s_fault(&self, id: u8, dir: I2sDirection) {
        if let Some((_, port)) = self.lock().i2s.by_id(id) {
            for st in port.streams(dir) {
                st.state = I2sState::Error;
            }
        }
    }
}
