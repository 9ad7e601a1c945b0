//! RTOS primitive boundary
//!
//! Threads, message queues, mutexes and semaphores of the underlying RTOS.
//! Blocking calls take a raw timeout (see [`crate::Timeout::as_raw`]).

use core::ffi::c_void;

use crate::Hal;

/// Thread entry point, called once with the three parameters given at
/// creation
pub type TaskEntry = unsafe extern "C" fn(p1: *mut c_void, p2: *mut c_void, p3: *mut c_void);

/// Native RTOS calls
pub trait OsHal: Hal {
    /// Create and start a thread
    ///
    /// # Safety
    ///
    /// `entry` is called exactly once on the new thread with `p1`, `p2`
    /// and `p3`; they must be valid to use from that thread.
    #[allow(clippy::too_many_arguments)]
    unsafe fn task_create(
        &self,
        name: &str,
        entry: TaskEntry,
        p1: *mut c_void,
        p2: *mut c_void,
        p3: *mut c_void,
        priority: i32,
        stack_size: u32,
    ) -> Option<Self::Handle>;

    /// Yield the processor to another ready thread
    fn task_yield(&self);

    /// Create a queue of `capacity` messages of `msg_size` bytes each
    fn mq_create(&self, msg_size: u32, capacity: u32) -> Option<Self::Handle>;

    /// Destroy a queue
    fn mq_destroy(&self, mq: Self::Handle) -> i32;

    /// Enqueue one message of exactly `msg_size` bytes
    fn mq_send(&self, mq: Self::Handle, msg: &[u8], timeout: i32) -> i32;

    /// Dequeue one message into a `msg_size` buffer
    fn mq_recv(&self, mq: Self::Handle, msg: &mut [u8], timeout: i32) -> i32;

    /// Copy the oldest message without removing it
    fn mq_peek(&self, mq: Self::Handle, msg: &mut [u8]) -> i32;

    /// Discard every queued message
    fn mq_purge(&self, mq: Self::Handle) -> i32;

    /// Create a mutex
    fn mutex_create(&self) -> Option<Self::Handle>;

    /// Destroy a mutex
    fn mutex_destroy(&self, mutex: Self::Handle) -> i32;

    /// Lock a mutex
    fn mutex_lock(&self, mutex: Self::Handle, timeout: i32) -> i32;

    /// Unlock a mutex held by the calling thread
    fn mutex_unlock(&self, mutex: Self::Handle) -> i32;

    /// Create a counting semaphore
    fn sem_create(&self, initial: u32, limit: u32) -> Option<Self::Handle>;

    /// Destroy a semaphore
    fn sem_destroy(&self, sem: Self::Handle) -> i32;

    /// Take one count
    fn sem_take(&self, sem: Self::Handle, timeout: i32) -> i32;

    /// Give one count, saturating at the limit
    fn sem_give(&self, sem: Self::Handle) -> i32;

    /// Reset the count to zero
    fn sem_reset(&self, sem: Self::Handle) -> i32;
}
