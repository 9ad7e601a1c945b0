//! Clock and delay boundary

/// Native time calls
pub trait TimeHal: Clone {
    /// Put the calling thread to sleep
    fn sleep_ms(&self, ms: u32);

    /// Busy-wait
    fn wait_us(&self, us: u32);

    /// Milliseconds since boot
    fn uptime_ms(&self) -> i64;

    /// Free-running hardware cycle counter
    fn hw_cycles(&self) -> u32;

    /// Convert hardware cycles to nanoseconds
    fn cycles_to_ns(&self, cycles: u32) -> u32;
}
