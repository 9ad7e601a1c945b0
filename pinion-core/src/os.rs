//! RTOS primitives
//!
//! Thin wrappers over the native thread, message queue, mutex and
//! semaphore calls. Blocking calls take a [`Timeout`].

use alloc::boxed::Box;
use core::ffi::c_void;

use pinion_hal::{OsHal, Timeout};

use crate::error::{check, Error, Invalid, Peripheral, Result};
use crate::handle::Owned;

pub const DEFAULT_PRIORITY: i32 = 0;
pub const DEFAULT_STACK_SIZE: u32 = 4096;

type Task = Box<dyn FnOnce() + Send>;

/// Thread parameters
#[derive(Debug, Clone, Copy)]
pub struct ThreadBuilder<'a> {
    name: &'a str,
    priority: i32,
    stack_size: u32,
}

impl Default for ThreadBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ThreadBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: "",
            priority: DEFAULT_PRIORITY,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    pub fn name(mut self, name: &'a str) -> Self {
        self.name = name;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn stack_size(mut self, stack_size: u32) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Start a thread running `f`
    pub fn spawn<H: OsHal>(self, hal: &H, f: impl FnOnce() + Send + 'static) -> Result<()> {
        let task: Box<Task> = Box::new(Box::new(f));
        let task = Box::into_raw(task);
        // SAFETY: `task_entry` takes the box back exactly once on the new
        // thread; the task is `Send`.
        let created = unsafe {
            hal.task_create(
                self.name,
                task_entry,
                task.cast::<c_void>(),
                core::ptr::null_mut(),
                core::ptr::null_mut(),
                self.priority,
                self.stack_size,
            )
        };
        match created {
            Some(_) => {
                debug!("spawned thread {}", self.name);
                Ok(())
            }
            None => {
                // SAFETY: the thread was not created, so nothing else owns it.
                drop(unsafe { Box::from_raw(task) });
                warn!("thread creation failed");
                Err(Error::OpenFailed {
                    kind: Peripheral::Thread,
                    id: 0,
                })
            }
        }
    }
}

unsafe extern "C" fn task_entry(p1: *mut c_void, _p2: *mut c_void, _p3: *mut c_void) {
    // SAFETY: `p1` is the `Box<Task>` leaked by `ThreadBuilder::spawn`.
    let task = unsafe { Box::from_raw(p1.cast::<Task>()) };
    task();
}

/// Let other ready threads run
pub fn yield_now<H: OsHal>(hal: &H) {
    hal.task_yield();
}

fn create<H: OsHal>(
    hal: &H,
    kind: Peripheral,
    raw: Option<H::Handle>,
    release: fn(&H, H::Handle) -> i32,
) -> Result<Owned<H>> {
    match raw {
        Some(raw) => Ok(Owned::new(hal.clone(), raw, kind, release)),
        None => {
            warn!("creating {:?} failed", kind);
            Err(Error::OpenFailed { kind, id: 0 })
        }
    }
}

/// Bounded queue of `N`-byte messages
pub struct MessageQueue<H: OsHal, const N: usize> {
    handle: Owned<H>,
    capacity: u32,
}

impl<H: OsHal, const N: usize> MessageQueue<H, N> {
    pub fn new(hal: &H, capacity: u32) -> Result<Self> {
        let msg_size = u32::try_from(N).map_err(|_| Error::InvalidArgument(Invalid::QueueSize))?;
        if msg_size == 0 || capacity == 0 {
            return Err(Error::InvalidArgument(Invalid::QueueSize));
        }
        let raw = hal.mq_create(msg_size, capacity);
        Ok(Self {
            handle: create(hal, Peripheral::Queue, raw, H::mq_destroy)?,
            capacity,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn send(&self, msg: &[u8; N], timeout: Timeout) -> Result<()> {
        check(self.handle.hal().mq_send(self.handle.raw(), msg, timeout.as_raw())).map(|_| ())
    }

    pub fn recv(&self, timeout: Timeout) -> Result<[u8; N]> {
        let mut msg = [0u8; N];
        check(self.handle.hal().mq_recv(self.handle.raw(), &mut msg, timeout.as_raw()))?;
        Ok(msg)
    }

    /// Copy the oldest message without removing it
    pub fn peek(&self) -> Result<[u8; N]> {
        let mut msg = [0u8; N];
        check(self.handle.hal().mq_peek(self.handle.raw(), &mut msg))?;
        Ok(msg)
    }

    /// Discard every queued message
    pub fn purge(&self) -> Result<()> {
        check(self.handle.hal().mq_purge(self.handle.raw())).map(|_| ())
    }
}

/// Recursive mutex owned by the locking thread
pub struct Mutex<H: OsHal> {
    handle: Owned<H>,
}

impl<H: OsHal> Mutex<H> {
    pub fn new(hal: &H) -> Result<Self> {
        let raw = hal.mutex_create();
        Ok(Self {
            handle: create(hal, Peripheral::Mutex, raw, H::mutex_destroy)?,
        })
    }

    pub fn lock(&self, timeout: Timeout) -> Result<()> {
        check(self.handle.hal().mutex_lock(self.handle.raw(), timeout.as_raw())).map(|_| ())
    }

    pub fn unlock(&self) -> Result<()> {
        check(self.handle.hal().mutex_unlock(self.handle.raw())).map(|_| ())
    }

    /// Lock and unlock again when the guard is dropped
    pub fn guard(&self, timeout: Timeout) -> Result<MutexGuard<'_, H>> {
        self.lock(timeout)?;
        Ok(MutexGuard { mutex: self })
    }
}

#[must_use = "the mutex unlocks as soon as the guard is dropped"]
pub struct MutexGuard<'a, H: OsHal> {
    mutex: &'a Mutex<H>,
}

impl<H: OsHal> MutexGuard<'_, H> {
    /// Unlock now and report the result
    pub fn unlock(self) -> Result<()> {
        let mutex = self.mutex;
        core::mem::forget(self);
        mutex.unlock()
    }
}

impl<H: OsHal> Drop for MutexGuard<'_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            warn!("mutex unlock failed: {:?}", e);
        }
    }
}

/// Counting semaphore
pub struct Semaphore<H: OsHal> {
    handle: Owned<H>,
    limit: u32,
}

impl<H: OsHal> Semaphore<H> {
    /// Create with `initial` permits, never more than `limit`
    pub fn new(hal: &H, initial: u32, limit: u32) -> Result<Self> {
        if limit == 0 || initial > limit {
            warn!("semaphore {} of {} is invalid", initial, limit);
            return Err(Error::InvalidArgument(Invalid::SemaphoreCount));
        }
        let raw = hal.sem_create(initial, limit);
        Ok(Self {
            handle: create(hal, Peripheral::Semaphore, raw, H::sem_destroy)?,
            limit,
        })
    }

    /// Binary semaphore, initially taken
    pub fn binary(hal: &H) -> Result<Self> {
        Self::new(hal, 0, 1)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn take(&self, timeout: Timeout) -> Result<()> {
        check(self.handle.hal().sem_take(self.handle.raw(), timeout.as_raw())).map(|_| ())
    }

    /// Release a permit; a full semaphore stays at its limit
    pub fn give(&self) -> Result<()> {
        check(self.handle.hal().sem_give(self.handle.raw())).map(|_| ())
    }

    /// Drop every permit
    pub fn reset(&self) -> Result<()> {
        check(self.handle.hal().sem_reset(self.handle.raw())).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU32, Ordering};
    use pinion_hal::Errno;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_queue_order_peek_purge() {
        let sim = SimHal::new();
        let mq = MessageQueue::<_, 2>::new(&sim, 2).unwrap();
        mq.send(&[1, 2], Timeout::NoWait).unwrap();
        mq.send(&[3, 4], Timeout::NoWait).unwrap();
        assert_eq!(
            mq.send(&[5, 6], Timeout::NoWait),
            Err(Error::Hal(Errno::ENOMSG))
        );
        assert_eq!(mq.peek().unwrap(), [1, 2]);
        assert_eq!(mq.recv(Timeout::NoWait).unwrap(), [1, 2]);
        mq.purge().unwrap();
        assert_eq!(mq.recv(Timeout::Millis(5)), Err(Error::Hal(Errno::EAGAIN)));
    }

    #[test]
    fn test_queue_size_checked() {
        let sim = SimHal::new();
        assert_eq!(
            MessageQueue::<_, 0>::new(&sim, 4).err(),
            Some(Error::InvalidArgument(Invalid::QueueSize))
        );
        assert_eq!(
            MessageQueue::<_, 4>::new(&sim, 0).err(),
            Some(Error::InvalidArgument(Invalid::QueueSize))
        );
        assert_eq!(sim.calls("mq_create"), 0);
    }

    #[test]
    fn test_semaphore_limits() {
        let sim = SimHal::new();
        assert_eq!(
            Semaphore::new(&sim, 3, 2).err(),
            Some(Error::InvalidArgument(Invalid::SemaphoreCount))
        );
        let sem = Semaphore::new(&sim, 1, 2).unwrap();
        sem.give().unwrap();
        sem.give().unwrap();
        sem.take(Timeout::NoWait).unwrap();
        sem.take(Timeout::NoWait).unwrap();
        assert_eq!(sem.take(Timeout::NoWait), Err(Error::Hal(Errno::EBUSY)));
        sem.give().unwrap();
        sem.reset().unwrap();
        assert!(sem.take(Timeout::NoWait).is_err());
    }

    #[test]
    fn test_mutex_guard_unlocks() {
        let sim = SimHal::new();
        let mutex = Mutex::new(&sim).unwrap();
        {
            let _guard = mutex.guard(Timeout::Forever).unwrap();
        }
        assert_eq!(sim.calls("mutex_unlock"), 1);
        mutex.guard(Timeout::NoWait).unwrap().unlock().unwrap();
        assert_eq!(sim.calls("mutex_unlock"), 2);
        assert_eq!(mutex.unlock(), Err(Error::Hal(Errno::EINVAL)));
    }

    #[test]
    fn test_thread_hands_off_through_semaphore() {
        let sim = SimHal::new();
        let sem = Arc::new(Semaphore::binary(&sim).unwrap());
        let ran = Arc::new(AtomicU32::new(0));
        let (s, r) = (sem.clone(), ran.clone());
        ThreadBuilder::new()
            .name("worker")
            .priority(2)
            .stack_size(2048)
            .spawn(&sim, move || {
                r.fetch_add(1, Ordering::SeqCst);
                let _ = s.give();
            })
            .unwrap();
        sem.take(Timeout::Forever).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        sim.join_threads();
    }

    #[test]
    fn test_spawn_failure_reclaims_task() {
        let sim = SimHal::new();
        let marker = Arc::new(());
        let held = marker.clone();
        sim.fail_next("task_create", Errno::ENOMEM);
        let err = ThreadBuilder::new().spawn(&sim, move || drop(held));
        assert_eq!(
            err,
            Err(Error::OpenFailed {
                kind: Peripheral::Thread,
                id: 0
            })
        );
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_destroyed_once() {
        let sim = SimHal::new();
        {
            let _q = MessageQueue::<_, 8>::new(&sim, 1).unwrap();
            let _m = Mutex::new(&sim).unwrap();
            let _s = Semaphore::binary(&sim).unwrap();
        }
        assert_eq!(sim.calls("mq_destroy"), 1);
        assert_eq!(sim.calls("mutex_destroy"), 1);
        assert_eq!(sim.calls("sem_destroy"), 1);
        assert_eq!(sim.open_handles(), 0);
    }
}
