//! Callback bridge
//!
//! Native interrupt, expiry and alarm registrations take a `(context,
//! trampoline)` pair. The context handed out here is the address of a boxed
//! cell that owns the user closure; the trampoline turns the address back
//! into a shared reference and runs the closure under a critical section.
//!
//! The box must outlive the registration. Owners therefore uninstall first
//! and only then [`retire`](Callback::retire) the callback: if the native
//! uninstall fails the box is leaked instead of freed, since the native
//! layer may still call into it.

use alloc::boxed::Box;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use pinion_hal::{AlarmTrampoline, Context, CounterHal, Trampoline};

use crate::error::{check, Result};

type Handler = Box<dyn FnMut() + Send>;
type AlarmHandler = Box<dyn FnMut(u32) -> Option<u32> + Send>;

struct Cell {
    handler: Mutex<CriticalSectionRawMutex, RefCell<Handler>>,
}

/// Heap-pinned closure for interrupt and expiry registrations
pub struct Callback {
    cell: Box<Cell>,
}

impl Callback {
    pub(crate) fn new(handler: impl FnMut() + Send + 'static) -> Self {
        Self {
            cell: Box::new(Cell {
                handler: Mutex::new(RefCell::new(Box::new(handler))),
            }),
        }
    }

    /// Address handed to the native layer
    pub(crate) fn context(&self) -> Context {
        &*self.cell as *const Cell as Context
    }

    pub(crate) fn trampoline(&self) -> Trampoline {
        trampoline
    }

    /// Dispose of the callback after its native uninstall returned `ret`
    pub(crate) fn retire(self, ret: i32) -> Result<()> {
        retire(self, ret)
    }
}

impl core::fmt::Debug for Callback {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Callback").field(&self.context()).finish()
    }
}

unsafe extern "C" fn trampoline(ctx: Context) {
    // SAFETY: `ctx` came from `Callback::context` and the owning `Callback`
    // is kept alive until the registration is removed.
    let cell = unsafe { &*(ctx as *const Cell) };
    cell.handler.lock(|handler| match handler.try_borrow_mut() {
        Ok(mut handler) => (&mut *handler)(),
        Err(_) => warn!("re-entrant interrupt dropped"),
    });
}

struct AlarmCell<H: CounterHal> {
    hal: H,
    counter: H::Handle,
    handler: Mutex<CriticalSectionRawMutex, RefCell<AlarmHandler>>,
}

/// Counter alarm closure
///
/// The closure gets the tick value at expiry and returns the relative
/// ticks of the next alarm, or `None` to leave the channel idle. The next
/// alarm is armed after the closure returns, outside the critical section.
pub struct AlarmCallback<H: CounterHal> {
    cell: Box<AlarmCell<H>>,
}

impl<H: CounterHal> AlarmCallback<H> {
    pub(crate) fn new(
        hal: H,
        counter: H::Handle,
        handler: impl FnMut(u32) -> Option<u32> + Send + 'static,
    ) -> Self {
        Self {
            cell: Box::new(AlarmCell {
                hal,
                counter,
                handler: Mutex::new(RefCell::new(Box::new(handler))),
            }),
        }
    }

    pub(crate) fn context(&self) -> Context {
        &*self.cell as *const AlarmCell<H> as Context
    }

    pub(crate) fn trampoline(&self) -> AlarmTrampoline {
        alarm_trampoline::<H>
    }

    pub(crate) fn retire(self, ret: i32) -> Result<()> {
        retire(self, ret)
    }
}

unsafe extern "C" fn alarm_trampoline<H: CounterHal>(ticks: u32, ctx: Context) {
    // SAFETY: see `trampoline`; the context is an `AlarmCell<H>` owned by a
    // live `AlarmCallback<H>`.
    let cell = unsafe { &*(ctx as *const AlarmCell<H>) };
    let next = cell
        .handler
        .lock(|handler| match handler.try_borrow_mut() {
            Ok(mut handler) => (&mut *handler)(ticks),
            Err(_) => {
                warn!("re-entrant alarm dropped");
                None
            }
        });
    if let Some(next) = next {
        let ret = cell.hal.counter_set_alarm(cell.counter, next);
        if ret < 0 {
            warn!("re-arming alarm failed: {}", ret);
        }
    }
}

fn retire<T>(callback: T, ret: i32) -> Result<()> {
    match check(ret) {
        Ok(_) => {
            drop(callback);
            Ok(())
        }
        Err(e) => {
            warn!("uninstall failed, leaking callback context: {:?}", e);
            core::mem::forget(callback);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU32, Ordering};
    use pinion_hal::counter::CounterMode;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_trampoline_reaches_closure() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let cb = Callback::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let tramp = cb.trampoline();
        for _ in 0..3 {
            unsafe { tramp(cb.context()) };
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        cb.retire(0).unwrap();
    }

    #[test]
    fn test_context_is_stable_across_moves() {
        let cb = Callback::new(|| {});
        let before = cb.context();
        let moved = cb;
        assert_eq!(moved.context(), before);
    }

    #[test]
    fn test_alarm_rearms_from_return_value() {
        let sim = SimHal::new();
        let counter = sim.counter_open(0, CounterMode::RisingEdge).unwrap();
        sim.counter_start(counter);
        let seen = Arc::new(AtomicU32::new(0));
        let s = seen.clone();
        let cb = AlarmCallback::new(sim.clone(), counter, move |ticks| {
            s.store(ticks, Ordering::SeqCst);
            Some(5)
        });
        unsafe { sim.counter_add_callback(counter, cb.context(), cb.trampoline()) };
        sim.counter_set_alarm(counter, 10);
        assert!(sim.counter_pulse(0, 10));
        assert_eq!(seen.load(Ordering::SeqCst), 10);
        assert_eq!(sim.counter_alarm_remaining(0), Some(5));
        cb.retire(sim.counter_remove_callback(counter)).unwrap();
        sim.counter_close(counter);
    }

    #[test]
    fn test_failed_uninstall_is_reported() {
        let cb = Callback::new(|| {});
        assert!(cb.retire(-16).is_err());
    }
}
