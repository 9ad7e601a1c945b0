//! RTOS primitives backed by host threads
//!
//! Each queue, mutex and semaphore carries its own lock and condition
//! variable so a blocked thread never holds the simulator lock.
//! Timeouts follow the native convention: `0` fails at once with
//! `ENOMSG`/`EBUSY`, a negative value waits forever, `N` waits up to N ms
//! and then fails with `EAGAIN`.

use std::collections::{HashMap, VecDeque};
use std::ffi::c_void;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use pinion_hal::os::{OsHal, TaskEntry};
use pinion_hal::Errno;

use crate::{enter, SimHal, SimHandle};

/// Smallest host stack handed to a simulated thread
const MIN_HOST_STACK: usize = 256 * 1024;

struct Queue {
    msg_size: usize,
    capacity: usize,
    items: Mutex<VecDeque<Vec<u8>>>,
    changed: Condvar,
}

#[derive(Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: u32,
}

#[derive(Default)]
struct RtosMutex {
    owner: Mutex<Owner>,
    released: Condvar,
}

struct Semaphore {
    limit: u32,
    count: Mutex<u32>,
    given: Condvar,
}

#[derive(Default)]
pub(crate) struct OsBank {
    queues: HashMap<SimHandle, Arc<Queue>>,
    mutexes: HashMap<SimHandle, Arc<RtosMutex>>,
    sems: HashMap<SimHandle, Arc<Semaphore>>,
    threads: Vec<JoinHandle<()>>,
}

impl OsBank {
    pub(crate) fn len(&self) -> usize {
        self.queues.len() + self.mutexes.len() + self.sems.len()
    }
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait on `cv` until `ready` holds or the native timeout expires
fn wait_for<'a, T>(
    mut guard: MutexGuard<'a, T>,
    cv: &Condvar,
    timeout: i32,
    busy: Errno,
    mut ready: impl FnMut(&mut T) -> bool,
) -> Result<MutexGuard<'a, T>, Errno> {
    if ready(&mut *guard) {
        return Ok(guard);
    }
    match timeout {
        0 => Err(busy),
        t if t < 0 => {
            while !ready(&mut *guard) {
                guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
            }
            Ok(guard)
        }
        t => {
            let (mut guard, _) = cv
                .wait_timeout_while(guard, Duration::from_millis(t as u64), |v| !ready(v))
                .unwrap_or_else(PoisonError::into_inner);
            if ready(&mut *guard) {
                Ok(guard)
            } else {
                Err(Errno::EAGAIN)
            }
        }
    }
}

/// Raw thread parameters carried to the host thread
struct TaskArgs {
    entry: TaskEntry,
    params: [usize; 3],
}

impl TaskArgs {
    /// # Safety
    ///
    /// Same contract as [`OsHal::task_create`].
    unsafe fn run(self) {
        let [p1, p2, p3] = self.params;
        // SAFETY: forwarded to the creator of the task.
        unsafe { (self.entry)(p1 as *mut c_void, p2 as *mut c_void, p3 as *mut c_void) }
    }
}

impl OsHal for SimHal {
    unsafe fn task_create(
        &self,
        name: &str,
        entry: TaskEntry,
        p1: *mut c_void,
        p2: *mut c_void,
        p3: *mut c_void,
        _priority: i32,
        stack_size: u32,
    ) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "task_create", None);
        let args = TaskArgs {
            entry,
            params: [p1 as usize, p2 as usize, p3 as usize],
        };
        let spawned = thread::Builder::new()
            .name(name.to_owned())
            .stack_size((stack_size as usize).max(MIN_HOST_STACK))
            // SAFETY: the caller guarantees the parameters are valid on the
            // new thread.
            .spawn(move || unsafe { args.run() })
            .ok()?;
        s.os.threads.push(spawned);
        Some(s.alloc())
    }

    fn task_yield(&self) {
        self.lock().enter("task_yield").ok();
        thread::yield_now();
    }

    fn mq_create(&self, msg_size: u32, capacity: u32) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "mq_create", None);
        if msg_size == 0 || capacity == 0 {
            return None;
        }
        let handle = s.alloc();
        s.os.queues.insert(
            handle,
            Arc::new(Queue {
                msg_size: msg_size as usize,
                capacity: capacity as usize,
                items: Mutex::new(VecDeque::new()),
                changed: Condvar::new(),
            }),
        );
        Some(handle)
    }

    fn mq_destroy(&self, mq: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "mq_destroy");
        match s.os.queues.remove(&mq) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn mq_send(&self, mq: SimHandle, msg: &[u8], timeout: i32) -> i32 {
        let q = {
            let mut s = self.lock();
            enter!(s, "mq_send");
            match s.os.queues.get(&mq) {
                Some(q) => Arc::clone(q),
                None => return s.bad_handle(),
            }
        };
        if msg.len() != q.msg_size {
            return Errno::EINVAL.as_ret();
        }
        let cap = q.capacity;
        let ret = match wait_for(relock(&q.items), &q.changed, timeout, Errno::ENOMSG, |items| {
            items.len() < cap
        }) {
            Ok(mut items) => {
                items.push_back(msg.to_vec());
                q.changed.notify_all();
                0
            }
            Err(errno) => errno.as_ret(),
        };
        ret
    }

    fn mq_recv(&self, mq: SimHandle, msg: &mut [u8], timeout: i32) -> i32 {
        let q = {
            let mut s = self.lock();
            enter!(s, "mq_recv");
            match s.os.queues.get(&mq) {
                Some(q) => Arc::clone(q),
                None => return s.bad_handle(),
            }
        };
        if msg.len() != q.msg_size {
            return Errno::EINVAL.as_ret();
        }
        let ret = match wait_for(relock(&q.items), &q.changed, timeout, Errno::ENOMSG, |items| {
            !items.is_empty()
        }) {
            Ok(mut items) => {
                if let Some(front) = items.pop_front() {
                    msg.copy_from_slice(&front);
                }
                q.changed.notify_all();
                0
            }
            Err(errno) => errno.as_ret(),
        };
        ret
    }

    fn mq_peek(&self, mq: SimHandle, msg: &mut [u8]) -> i32 {
        let q = {
            let mut s = self.lock();
            enter!(s, "mq_peek");
            match s.os.queues.get(&mq) {
                Some(q) => Arc::clone(q),
                None => return s.bad_handle(),
            }
        };
        if msg.len() != q.msg_size {
            return Errno::EINVAL.as_ret();
        }
        let ret = match relock(&q.items).front() {
            Some(front) => {
                msg.copy_from_slice(front);
                0
            }
            None => Errno::ENOMSG.as_ret(),
        };
        ret
    }

    fn mq_purge(&self, mq: SimHandle) -> i32 {
        let q = {
            let mut s = self.lock();
            enter!(s, "mq_purge");
            match s.os.queues.get(&mq) {
                Some(q) => Arc::clone(q),
                None => return s.bad_handle(),
            }
        };
        relock(&q.items).clear();
        q.changed.notify_all();
        0
    }

    fn mutex_create(&self) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "mutex_create", None);
        let handle = s.alloc();
        s.os.mutexes.insert(handle, Arc::default());
        Some(handle)
    }

    fn mutex_destroy(&self, mutex: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "mutex_destroy");
        match s.os.mutexes.remove(&mutex) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn mutex_lock(&self, mutex: SimHandle, timeout: i32) -> i32 {
        let m = {
            let mut s = self.lock();
            enter!(s, "mutex_lock");
            match s.os.mutexes.get(&mutex) {
                Some(m) => Arc::clone(m),
                None => return s.bad_handle(),
            }
        };
        let me = thread::current().id();
        let ret = match wait_for(relock(&m.owner), &m.released, timeout, Errno::EBUSY, |o| {
            o.thread.is_none() || o.thread == Some(me)
        }) {
            Ok(mut owner) => {
                owner.thread = Some(me);
                owner.depth += 1;
                0
            }
            Err(errno) => errno.as_ret(),
        };
        ret
    }

    fn mutex_unlock(&self, mutex: SimHandle) -> i32 {
        let m = {
            let mut s = self.lock();
            enter!(s, "mutex_unlock");
            match s.os.mutexes.get(&mutex) {
                Some(m) => Arc::clone(m),
                None => return s.bad_handle(),
            }
        };
        let mut owner = relock(&m.owner);
        match owner.thread {
            None => Errno::EINVAL.as_ret(),
            Some(t) if t != thread::current().id() => Errno::EPERM.as_ret(),
            Some(_) => {
                owner.depth -= 1;
                if owner.depth == 0 {
                    owner.thread = None;
                    m.released.notify_all();
                }
                0
            }
        }
    }

    fn sem_create(&self, initial: u32, limit: u32) -> Option<SimHandle> {
        let mut s = self.lock();
        enter!(s, "sem_create", None);
        if limit == 0 || initial > limit {
            return None;
        }
        let handle = s.alloc();
        s.os.sems.insert(
            handle,
            Arc::new(Semaphore {
                limit,
                count: Mutex::new(initial),
                given: Condvar::new(),
            }),
        );
        Some(handle)
    }

    fn sem_destroy(&self, sem: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "sem_destroy");
        match s.os.sems.remove(&sem) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn sem_take(&self, sem: SimHandle, timeout: i32) -> i32 {
        let sem = {
            let mut s = self.lock();
            enter!(s, "sem_take");
            match s.os.sems.get(&sem) {
                Some(sem) => Arc::clone(sem),
                None => return s.bad_handle(),
            }
        };
        let ret = match wait_for(relock(&sem.count), &sem.given, timeout, Errno::EBUSY, |c| *c > 0) {
            Ok(mut count) => {
                *count -= 1;
                0
            }
            Err(errno) => errno.as_ret(),
        };
        ret
    }

    fn sem_give(&self, sem: SimHandle) -> i32 {
        let sem = {
            let mut s = self.lock();
            enter!(s, "sem_give");
            match s.os.sems.get(&sem) {
                Some(sem) => Arc::clone(sem),
                None => return s.bad_handle(),
            }
        };
        let mut count = relock(&sem.count);
        if *count < sem.limit {
            *count += 1;
        }
        sem.given.notify_one();
        0
    }

    fn sem_reset(&self, sem: SimHandle) -> i32 {
        let sem = {
            let mut s = self.lock();
            enter!(s, "sem_reset");
            match s.os.sems.get(&sem) {
                Some(sem) => Arc::clone(sem),
                None => return s.bad_handle(),
            }
        };
        *relock(&sem.count) = 0;
        0
    }
}

impl SimHal {
    /// Wait for every thread created through [`OsHal::task_create`]
    pub fn join_threads(&self) {
        let threads = core::mem::take(&mut self.lock().os.threads);
        for t in threads {
            t.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_no_wait_and_timeout() {
        let sim = SimHal::new();
        let mq = sim.mq_create(2, 1).unwrap();
        assert_eq!(sim.mq_send(mq, &[1, 2], 0), 0);
        assert_eq!(sim.mq_send(mq, &[3, 4], 0), Errno::ENOMSG.as_ret());
        assert_eq!(sim.mq_send(mq, &[3, 4], 5), Errno::EAGAIN.as_ret());
        assert_eq!(sim.mq_send(mq, &[3], 0), Errno::EINVAL.as_ret());

        let mut out = [0u8; 2];
        assert_eq!(sim.mq_peek(mq, &mut out), 0);
        assert_eq!(sim.mq_recv(mq, &mut out, -1), 0);
        assert_eq!(out, [1, 2]);
        assert_eq!(sim.mq_recv(mq, &mut out, 0), Errno::ENOMSG.as_ret());
    }

    #[test]
    fn test_semaphore_limit() {
        let sim = SimHal::new();
        let sem = sim.sem_create(0, 2).unwrap();
        for _ in 0..5 {
            sim.sem_give(sem);
        }
        assert_eq!(sim.sem_take(sem, 0), 0);
        assert_eq!(sim.sem_take(sem, 0), 0);
        assert_eq!(sim.sem_take(sem, 0), Errno::EBUSY.as_ret());
        assert!(sim.sem_create(3, 2).is_none());
    }

    #[test]
    fn test_mutex_recursive_and_owned() {
        let sim = SimHal::new();
        let m = sim.mutex_create().unwrap();
        assert_eq!(sim.mutex_lock(m, 0), 0);
        assert_eq!(sim.mutex_lock(m, 0), 0);

        let other = sim.clone();
        let from_other = thread::spawn(move || other.mutex_lock(m, 0)).join().unwrap();
        assert_eq!(from_other, Errno::EBUSY.as_ret());

        assert_eq!(sim.mutex_unlock(m), 0);
        assert_eq!(sim.mutex_unlock(m), 0);
        assert_eq!(sim.mutex_unlock(m), Errno::EINVAL.as_ret());
    }
}
