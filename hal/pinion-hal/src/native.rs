//! C HAL backend
//!
//! Forwards every trait method to the native `pinion_*` symbols provided by
//! the board support package. Slices are passed as pointer/length pairs and
//! paths are copied into NUL-terminated stack buffers.

use core::ffi::{c_char, c_int, c_uint, c_ulong, c_ushort, c_void};
use core::ptr::NonNull;

use heapless::Vec;

use crate::adc::{AdcHal, AdcInfo};
use crate::counter::{CounterHal, CounterMode};
use crate::errno::Errno;
use crate::eth::{EthHal, EthTransmit};
use crate::fs::{EntryKind, FsHal, RawDirEntry, StatVfs, MAX_NAME_LEN};
use crate::gpio::{Direction, GpioHal, InterruptMode, PinMode};
use crate::i2c::I2cHal;
use crate::i2s::{I2sDirection, I2sHal, I2sTrigger, RawI2sConfig};
use crate::os::{OsHal, TaskEntry};
use crate::pwm::{PwmHal, PwmInfo};
use crate::spi::SpiHal;
use crate::time::TimeHal;
use crate::timer::{TimerHal, TimerMode};
use crate::uart::{RawUartConfig, UartHal};
use crate::{AlarmTrampoline, Context, Hal, Trampoline};

/// Opaque pointer returned by a native open call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHandle(NonNull<c_void>);

// SAFETY: native handles are plain tokens; the C HAL serialises access to
// the resource behind them.
unsafe impl Send for NativeHandle {}
// SAFETY: see above, the token itself is never dereferenced on the Rust side.
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(NativeHandle)
    }

    fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// The board's C HAL
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeHal;

impl Hal for NativeHal {
    type Handle = NativeHandle;
}

#[repr(C)]
struct CAdcInfo {
    resolution: isize,
    ref_voltage: f32,
}

#[repr(C)]
struct CPwmInfo {
    max_frequency: isize,
    min_frequency: isize,
}

#[repr(C)]
struct CDirent {
    kind: c_int,
    name: [c_char; MAX_NAME_LEN + 1],
    size: usize,
}

#[repr(C)]
struct CStatVfs {
    f_bsize: c_ulong,
    f_frsize: c_ulong,
    f_blocks: c_ulong,
    f_bfree: c_ulong,
}

extern "C" {
    fn pinion_gpio_dev_number_get() -> c_int;
    fn pinion_gpio_open(id: c_int, direction: c_int, mode: c_int) -> *mut c_void;
    fn pinion_gpio_close(gpio: *mut c_void) -> c_int;
    fn pinion_gpio_config(gpio: *mut c_void, direction: c_int, mode: c_int) -> c_int;
    fn pinion_gpio_set(gpio: *mut c_void, level: c_int) -> c_int;
    fn pinion_gpio_get(gpio: *mut c_void) -> c_int;
    fn pinion_gpio_interrupt_config(gpio: *mut c_void, mode: c_int) -> c_int;
    fn pinion_gpio_interrupt_callback_install(
        gpio: *mut c_void,
        param: *const c_void,
        callback: Trampoline,
    ) -> c_int;
    fn pinion_gpio_interrupt_callback_uninstall(gpio: *mut c_void) -> c_int;
    fn pinion_gpio_interrupt_enable(gpio: *mut c_void) -> c_int;
    fn pinion_gpio_interrupt_disable(gpio: *mut c_void) -> c_int;

    fn pinion_adc_dev_number_get() -> c_int;
    fn pinion_adc_open(id: c_int) -> *mut c_void;
    fn pinion_adc_close(adc: *mut c_void) -> c_int;
    fn pinion_adc_read(adc: *mut c_void) -> c_int;
    fn pinion_adc_info_get(adc: *mut c_void, info: *mut CAdcInfo) -> c_int;

    fn pinion_pwm_dev_number_get() -> c_int;
    fn pinion_pwm_open(id: c_int) -> *mut c_void;
    fn pinion_pwm_close(pwm: *mut c_void) -> c_int;
    fn pinion_pwm_set(pwm: *mut c_void, period: isize, pulse: isize) -> c_int;
    fn pinion_pwm_suspend(pwm: *mut c_void) -> c_int;
    fn pinion_pwm_resume(pwm: *mut c_void) -> c_int;
    fn pinion_pwm_info_get(pwm: *mut c_void, info: *mut CPwmInfo) -> c_int;

    fn pinion_counter_dev_number_get() -> c_int;
    fn pinion_counter_open(id: c_int, mode: c_int) -> *mut c_void;
    fn pinion_counter_close(counter: *mut c_void) -> c_int;
    fn pinion_counter_config(counter: *mut c_void, mode: c_int) -> c_int;
    fn pinion_counter_read(counter: *mut c_void, ticks: *mut u32) -> c_int;
    fn pinion_counter_take(counter: *mut c_void, ticks: *mut u32) -> c_int;
    fn pinion_counter_start(counter: *mut c_void) -> c_int;
    fn pinion_counter_stop(counter: *mut c_void) -> c_int;
    fn pinion_counter_freq(counter: *mut c_void) -> u32;
    fn pinion_counter_ticks_to_us(counter: *mut c_void, ticks: u32) -> u64;
    fn pinion_counter_us_to_ticks(counter: *mut c_void, us: u64) -> u32;
    fn pinion_counter_get_max_top_value(counter: *mut c_void) -> u32;
    fn pinion_counter_add_callback(
        counter: *mut c_void,
        user_data: *const c_void,
        callback: AlarmTrampoline,
    ) -> c_int;
    fn pinion_counter_remove_callback(counter: *mut c_void) -> c_int;
    fn pinion_counter_set_channel_alarm(counter: *mut c_void, ticks: u32) -> c_int;
    fn pinion_counter_cancel_channel_alarm(counter: *mut c_void) -> c_int;

    fn pinion_timer_open() -> *mut c_void;
    fn pinion_timer_close(timer: *mut c_void) -> c_int;
    fn pinion_timer_start(timer: *mut c_void, mode: c_int, period: isize) -> c_int;
    fn pinion_timer_stop(timer: *mut c_void) -> c_int;
    fn pinion_timer_add_callback(
        timer: *mut c_void,
        param: *const c_void,
        callback: Trampoline,
    ) -> c_int;
    fn pinion_timer_remove_callback(timer: *mut c_void) -> c_int;
    fn pinion_timer_status_get(timer: *mut c_void) -> u32;
    fn pinion_timer_remaining_get(timer: *mut c_void) -> u32;

    fn pinion_i2c_dev_number_get() -> c_int;
    fn pinion_i2c_open(id: c_int) -> *mut c_void;
    fn pinion_i2c_close(i2c: *mut c_void) -> c_int;
    fn pinion_i2c_config(i2c: *mut c_void, speed: c_uint) -> c_int;
    fn pinion_i2c_write(i2c: *mut c_void, address: u8, buf: *const u8, len: c_int) -> c_int;
    fn pinion_i2c_read(i2c: *mut c_void, address: u8, buf: *mut u8, len: c_int) -> c_int;
    fn pinion_i2c_write_read(
        i2c: *mut c_void,
        address: u8,
        write_buf: *const u8,
        num_write: c_int,
        read_buf: *mut u8,
        num_read: c_int,
    ) -> c_int;

    fn pinion_spi_dev_number_get() -> c_int;
    fn pinion_spi_open(id: c_int, speed: c_int, operation: c_ushort) -> *mut c_void;
    fn pinion_spi_close(spi: *mut c_void) -> c_int;
    fn pinion_spi_config(spi: *mut c_void, speed: c_int, operation: c_ushort) -> c_int;
    fn pinion_spi_write(spi: *mut c_void, buf: *const u8, len: c_int) -> c_int;
    fn pinion_spi_read(spi: *mut c_void, buf: *mut u8, len: c_int) -> c_int;
    fn pinion_spi_transceive(
        spi: *mut c_void,
        w_buf: *const u8,
        w_len: c_int,
        r_buf: *mut u8,
        r_len: c_int,
    ) -> c_int;

    fn pinion_uart_dev_number_get() -> c_int;
    fn pinion_uart_open(id: c_int, cfg: *const RawUartConfig) -> *mut c_void;
    fn pinion_uart_close(uart: *mut c_void) -> c_int;
    fn pinion_uart_config(uart: *mut c_void, cfg: *const RawUartConfig) -> c_int;
    fn pinion_uart_char_put(uart: *mut c_void, c: u8) -> c_int;
    fn pinion_uart_char_get(uart: *mut c_void, c: *mut u8, timeout: c_int) -> c_int;
    fn pinion_uart_write(uart: *mut c_void, buf: *const u8, len: c_int) -> c_int;
    fn pinion_uart_read(uart: *mut c_void, buf: *mut u8, len: c_int, timeout: c_int) -> c_int;
    fn pinion_uart_remainder_get(uart: *mut c_void) -> c_int;
    fn pinion_uart_buffer_clear(uart: *mut c_void) -> c_int;

    fn pinion_i2s_dev_number_get() -> c_int;
    fn pinion_i2s_handle_get(id: c_int) -> *mut c_void;
    fn pinion_i2s_open(id: c_int) -> *mut c_void;
    fn pinion_i2s_close(i2s: *mut c_void) -> c_int;
    fn pinion_i2s_config_set(i2s: *mut c_void, dir: c_int, cfg: *const RawI2sConfig) -> c_int;
    fn pinion_i2s_trigger(i2s: *mut c_void, dir: c_int, cmd: c_int) -> c_int;
    fn pinion_i2s_status_get(i2s: *mut c_void, dir: c_int) -> c_int;
    fn pinion_i2s_write(i2s: *mut c_void, buf: *const u8, len: c_int) -> c_int;
    fn pinion_i2s_read(i2s: *mut c_void, buf: *mut u8, len: c_int, timeout: c_int) -> c_int;

    fn pinion_os_task_create(
        name: *const c_char,
        entry: TaskEntry,
        p1: *mut c_void,
        p2: *mut c_void,
        p3: *mut c_void,
        prio: c_int,
        stack_size: c_int,
    ) -> *mut c_void;
    fn pinion_os_task_yield();
    fn pinion_os_mq_create(mq_size: c_int, mq_num: c_int) -> *mut c_void;
    fn pinion_os_mq_destroy(mq: *mut c_void) -> c_int;
    fn pinion_os_mq_send(mq: *mut c_void, data: *const c_void, timeout: c_int) -> c_int;
    fn pinion_os_mq_recv(mq: *mut c_void, data: *mut c_void, timeout: c_int) -> c_int;
    fn pinion_os_mq_peek(mq: *mut c_void, data: *mut c_void) -> c_int;
    fn pinion_os_mq_purge(mq: *mut c_void) -> c_int;
    fn pinion_os_mutex_create() -> *mut c_void;
    fn pinion_os_mutex_destroy(mutex: *mut c_void) -> c_int;
    fn pinion_os_mutex_lock(mutex: *mut c_void, timeout: c_int) -> c_int;
    fn pinion_os_mutex_unlock(mutex: *mut c_void) -> c_int;
    fn pinion_os_sem_create(init_cnt: c_uint, limit: c_uint) -> *mut c_void;
    fn pinion_os_sem_destroy(sem: *mut c_void) -> c_int;
    fn pinion_os_sem_take(sem: *mut c_void, timeout: c_int) -> c_int;
    fn pinion_os_sem_give(sem: *mut c_void) -> c_int;
    fn pinion_os_sem_reset(sem: *mut c_void) -> c_int;

    fn pinion_fs_open(fp: *mut *mut c_void, path: *const c_char, flags: u8) -> c_int;
    fn pinion_fs_close(fp: *mut c_void) -> c_int;
    fn pinion_fs_remove(path: *const c_char) -> c_int;
    fn pinion_fs_rename(from: *const c_char, to: *const c_char) -> c_int;
    fn pinion_fs_write(fp: *mut c_void, buf: *const c_void, size: isize) -> c_int;
    fn pinion_fs_read(fp: *mut c_void, buf: *mut c_void, size: isize) -> c_int;
    fn pinion_fs_seek(fp: *mut c_void, offset: isize, whence: c_int) -> c_int;
    fn pinion_fs_tell(fp: *mut c_void) -> c_int;
    fn pinion_fs_truncate(fp: *mut c_void, length: isize) -> c_int;
    fn pinion_fs_sync(fp: *mut c_void) -> c_int;
    fn pinion_fs_mkdir(path: *const c_char) -> c_int;
    fn pinion_fs_opendir(dp: *mut *mut c_void, path: *const c_char) -> c_int;
    fn pinion_fs_readdir(dp: *mut c_void, entry: *mut CDirent) -> c_int;
    fn pinion_fs_closedir(dp: *mut c_void) -> c_int;
    fn pinion_fs_stat(path: *const c_char, entry: *mut CDirent) -> c_int;
    fn pinion_fs_statfs(path: *const c_char, stat: *mut CStatVfs) -> c_int;

    fn pinion_eth_setup_mac(mac: *const u8) -> c_int;
    fn pinion_eth_tx_register(send: EthTransmit) -> c_int;
    fn pinion_eth_rx(buffer: *const c_void, len: c_ushort) -> c_int;
    fn pinion_eth_event_send(
        event_id: c_int,
        event_data: *const c_void,
        event_data_size: c_int,
        ticks_to_wait: c_int,
    ) -> c_int;

    fn pinion_ms_sleep(ms: c_int);
    fn pinion_us_wait(us: c_uint);
    fn pinion_uptime_get() -> i64;
    fn pinion_hwcycle_get() -> c_uint;
    fn pinion_hwcycle_to_ns(cycles: c_uint) -> c_uint;
}

/// NUL-terminated copy of a path for the C side
type CPath = Vec<u8, { MAX_NAME_LEN + 1 }>;

fn c_path(path: &str) -> Result<CPath, i32> {
    let mut buf = CPath::new();
    buf.extend_from_slice(path.as_bytes())
        .and_then(|()| buf.push(0).map_err(|_| ()))
        .map_err(|()| Errno::ENAMETOOLONG.as_ret())?;
    Ok(buf)
}

fn c_len(len: usize) -> Result<c_int, i32> {
    c_int::try_from(len).map_err(|_| Errno::EINVAL.as_ret())
}

fn count(raw: c_int) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

fn dirent_from_c(src: &CDirent, dst: &mut RawDirEntry) {
    dst.kind = if src.kind == EntryKind::Dir as c_int {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    dst.name.clear();
    for &c in src.name.iter().take_while(|&&c| c != 0) {
        // Names are stored as bytes; non-UTF-8 names are truncated at the
        // first byte outside ASCII.
        let b = c as u8;
        if !b.is_ascii() || dst.name.push(char::from(b)).is_err() {
            break;
        }
    }
    dst.size = src.size as u64;
}

macro_rules! try_ret {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(ret) => return ret,
        }
    };
}

impl GpioHal for NativeHal {
    fn gpio_device_count(&self) -> u32 {
        // SAFETY: no arguments, pure query.
        count(unsafe { pinion_gpio_dev_number_get() })
    }

    fn gpio_open(&self, id: u8, direction: Direction, mode: PinMode) -> Option<NativeHandle> {
        // SAFETY: plain integer arguments.
        NativeHandle::from_raw(unsafe {
            pinion_gpio_open(c_int::from(id), direction as c_int, mode as c_int)
        })
    }

    fn gpio_close(&self, pin: NativeHandle) -> i32 {
        // SAFETY: `pin` came from `pinion_gpio_open` and the wrapper closes it once.
        unsafe { pinion_gpio_close(pin.as_ptr()) }
    }

    fn gpio_configure(&self, pin: NativeHandle, direction: Direction, mode: PinMode) -> i32 {
        // SAFETY: `pin` is an open GPIO handle.
        unsafe { pinion_gpio_config(pin.as_ptr(), direction as c_int, mode as c_int) }
    }

    fn gpio_set(&self, pin: NativeHandle, high: bool) -> i32 {
        // SAFETY: `pin` is an open GPIO handle.
        unsafe { pinion_gpio_set(pin.as_ptr(), c_int::from(high)) }
    }

    fn gpio_get(&self, pin: NativeHandle) -> i32 {
        // SAFETY: `pin` is an open GPIO handle.
        unsafe { pinion_gpio_get(pin.as_ptr()) }
    }

    fn gpio_interrupt_configure(&self, pin: NativeHandle, mode: InterruptMode) -> i32 {
        // SAFETY: `pin` is an open GPIO handle.
        unsafe { pinion_gpio_interrupt_config(pin.as_ptr(), mode as c_int) }
    }

    unsafe fn gpio_interrupt_install(
        &self,
        pin: NativeHandle,
        ctx: Context,
        callback: Trampoline,
    ) -> i32 {
        // SAFETY: the caller keeps `ctx` alive until uninstall.
        unsafe { pinion_gpio_interrupt_callback_install(pin.as_ptr(), ctx, callback) }
    }

    fn gpio_interrupt_uninstall(&self, pin: NativeHandle) -> i32 {
        // SAFETY: `pin` is an open GPIO handle.
        unsafe { pinion_gpio_interrupt_callback_uninstall(pin.as_ptr()) }
    }

    fn gpio_interrupt_enable(&self, pin: NativeHandle) -> i32 {
        // SAFETY: `pin` is an open GPIO handle.
        unsafe { pinion_gpio_interrupt_enable(pin.as_ptr()) }
    }

    fn gpio_interrupt_disable(&self, pin: NativeHandle) -> i32 {
        // SAFETY: `pin` is an open GPIO handle.
        unsafe { pinion_gpio_interrupt_disable(pin.as_ptr()) }
    }
}

impl AdcHal for NativeHal {
    fn adc_device_count(&self) -> u32 {
        // SAFETY: pure query.
        count(unsafe { pinion_adc_dev_number_get() })
    }

    fn adc_open(&self, id: u8) -> Option<NativeHandle> {
        // SAFETY: plain integer argument.
        NativeHandle::from_raw(unsafe { pinion_adc_open(c_int::from(id)) })
    }

    fn adc_close(&self, adc: NativeHandle) -> i32 {
        // SAFETY: `adc` is an open ADC handle, closed once.
        unsafe { pinion_adc_close(adc.as_ptr()) }
    }

    fn adc_read(&self, adc: NativeHandle) -> i32 {
        // SAFETY: `adc` is an open ADC handle.
        unsafe { pinion_adc_read(adc.as_ptr()) }
    }

    fn adc_info(&self, adc: NativeHandle, info: &mut AdcInfo) -> i32 {
        let mut raw = CAdcInfo {
            resolution: 0,
            ref_voltage: 0.0,
        };
        // SAFETY: `raw` is a valid out-parameter for the duration of the call.
        let ret = unsafe { pinion_adc_info_get(adc.as_ptr(), &mut raw) };
        if ret >= 0 {
            info.resolution_bits = u8::try_from(raw.resolution).unwrap_or(0);
            info.ref_voltage = raw.ref_voltage;
        }
        ret
    }
}

impl PwmHal for NativeHal {
    fn pwm_device_count(&self) -> u32 {
        // SAFETY: pure query.
        count(unsafe { pinion_pwm_dev_number_get() })
    }

    fn pwm_open(&self, id: u8) -> Option<NativeHandle> {
        // SAFETY: plain integer argument.
        NativeHandle::from_raw(unsafe { pinion_pwm_open(c_int::from(id)) })
    }

    fn pwm_close(&self, pwm: NativeHandle) -> i32 {
        // SAFETY: `pwm` is an open PWM handle, closed once.
        unsafe { pinion_pwm_close(pwm.as_ptr()) }
    }

    fn pwm_set(&self, pwm: NativeHandle, period_us: u32, pulse_us: u32) -> i32 {
        // SAFETY: `pwm` is an open PWM handle.
        unsafe { pinion_pwm_set(pwm.as_ptr(), period_us as isize, pulse_us as isize) }
    }

    fn pwm_suspend(&self, pwm: NativeHandle) -> i32 {
        // SAFETY: `pwm` is an open PWM handle.
        unsafe { pinion_pwm_suspend(pwm.as_ptr()) }
    }

    fn pwm_resume(&self, pwm: NativeHandle) -> i32 {
        // SAFETY: `pwm` is an open PWM handle.
        unsafe { pinion_pwm_resume(pwm.as_ptr()) }
    }

    fn pwm_info(&self, pwm: NativeHandle, info: &mut PwmInfo) -> i32 {
        let mut raw = CPwmInfo {
            max_frequency: 0,
            min_frequency: 0,
        };
        // SAFETY: `raw` is a valid out-parameter for the duration of the call.
        let ret = unsafe { pinion_pwm_info_get(pwm.as_ptr(), &mut raw) };
        if ret >= 0 {
            info.max_frequency = u32::try_from(raw.max_frequency).unwrap_or(0);
            info.min_frequency = u32::try_from(raw.min_frequency).unwrap_or(0);
        }
        ret
    }
}

impl CounterHal for NativeHal {
    fn counter_device_count(&self) -> u32 {
        // SAFETY: pure query.
        count(unsafe { pinion_counter_dev_number_get() })
    }

    fn counter_open(&self, id: u8, mode: CounterMode) -> Option<NativeHandle> {
        // SAFETY: plain integer arguments.
        NativeHandle::from_raw(unsafe { pinion_counter_open(c_int::from(id), mode as c_int) })
    }

    fn counter_close(&self, counter: NativeHandle) -> i32 {
        // SAFETY: `counter` is an open handle, closed once.
        unsafe { pinion_counter_close(counter.as_ptr()) }
    }

    fn counter_configure(&self, counter: NativeHandle, mode: CounterMode) -> i32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_config(counter.as_ptr(), mode as c_int) }
    }

    fn counter_read(&self, counter: NativeHandle, ticks: &mut u32) -> i32 {
        // SAFETY: `ticks` is a valid out-parameter.
        unsafe { pinion_counter_read(counter.as_ptr(), ticks) }
    }

    fn counter_take(&self, counter: NativeHandle, ticks: &mut u32) -> i32 {
        // SAFETY: `ticks` is a valid out-parameter.
        unsafe { pinion_counter_take(counter.as_ptr(), ticks) }
    }

    fn counter_start(&self, counter: NativeHandle) -> i32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_start(counter.as_ptr()) }
    }

    fn counter_stop(&self, counter: NativeHandle) -> i32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_stop(counter.as_ptr()) }
    }

    fn counter_frequency(&self, counter: NativeHandle) -> u32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_freq(counter.as_ptr()) }
    }

    fn counter_ticks_to_us(&self, counter: NativeHandle, ticks: u32) -> u64 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_ticks_to_us(counter.as_ptr(), ticks) }
    }

    fn counter_us_to_ticks(&self, counter: NativeHandle, us: u64) -> u32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_us_to_ticks(counter.as_ptr(), us) }
    }

    fn counter_max_top_value(&self, counter: NativeHandle) -> u32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_get_max_top_value(counter.as_ptr()) }
    }

    unsafe fn counter_add_callback(
        &self,
        counter: NativeHandle,
        ctx: Context,
        callback: AlarmTrampoline,
    ) -> i32 {
        // SAFETY: the caller keeps `ctx` alive until the callback is removed.
        unsafe { pinion_counter_add_callback(counter.as_ptr(), ctx, callback) }
    }

    fn counter_remove_callback(&self, counter: NativeHandle) -> i32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_remove_callback(counter.as_ptr()) }
    }

    fn counter_set_alarm(&self, counter: NativeHandle, ticks: u32) -> i32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_set_channel_alarm(counter.as_ptr(), ticks) }
    }

    fn counter_cancel_alarm(&self, counter: NativeHandle) -> i32 {
        // SAFETY: `counter` is an open handle.
        unsafe { pinion_counter_cancel_channel_alarm(counter.as_ptr()) }
    }
}

impl TimerHal for NativeHal {
    fn timer_open(&self) -> Option<NativeHandle> {
        // SAFETY: no arguments.
        NativeHandle::from_raw(unsafe { pinion_timer_open() })
    }

    fn timer_close(&self, timer: NativeHandle) -> i32 {
        // SAFETY: `timer` is an open handle, closed once.
        unsafe { pinion_timer_close(timer.as_ptr()) }
    }

    fn timer_start(&self, timer: NativeHandle, mode: TimerMode, period_ms: u32) -> i32 {
        // SAFETY: `timer` is an open handle.
        unsafe { pinion_timer_start(timer.as_ptr(), mode as c_int, period_ms as isize) }
    }

    fn timer_stop(&self, timer: NativeHandle) -> i32 {
        // SAFETY: `timer` is an open handle.
        unsafe { pinion_timer_stop(timer.as_ptr()) }
    }

    unsafe fn timer_add_callback(
        &self,
        timer: NativeHandle,
        ctx: Context,
        callback: Trampoline,
    ) -> i32 {
        // SAFETY: the caller keeps `ctx` alive until the callback is removed.
        unsafe { pinion_timer_add_callback(timer.as_ptr(), ctx, callback) }
    }

    fn timer_remove_callback(&self, timer: NativeHandle) -> i32 {
        // SAFETY: `timer` is an open handle.
        unsafe { pinion_timer_remove_callback(timer.as_ptr()) }
    }

    fn timer_status(&self, timer: NativeHandle) -> u32 {
        // SAFETY: `timer` is an open handle.
        unsafe { pinion_timer_status_get(timer.as_ptr()) }
    }

    fn timer_remaining(&self, timer: NativeHandle) -> u32 {
        // SAFETY: `timer` is an open handle.
        unsafe { pinion_timer_remaining_get(timer.as_ptr()) }
    }
}

impl I2cHal for NativeHal {
    fn i2c_device_count(&self) -> u32 {
        // SAFETY: pure query.
        count(unsafe { pinion_i2c_dev_number_get() })
    }

    fn i2c_open(&self, id: u8) -> Option<NativeHandle> {
        // SAFETY: plain integer argument.
        NativeHandle::from_raw(unsafe { pinion_i2c_open(c_int::from(id)) })
    }

    fn i2c_close(&self, i2c: NativeHandle) -> i32 {
        // SAFETY: `i2c` is an open handle, closed once.
        unsafe { pinion_i2c_close(i2c.as_ptr()) }
    }

    fn i2c_configure(&self, i2c: NativeHandle, speed_hz: u32) -> i32 {
        // SAFETY: `i2c` is an open handle.
        unsafe { pinion_i2c_config(i2c.as_ptr(), speed_hz) }
    }

    fn i2c_write(&self, i2c: NativeHandle, address: u8, data: &[u8]) -> i32 {
        let len = try_ret!(c_len(data.len()));
        // SAFETY: `data` is valid for `len` bytes.
        unsafe { pinion_i2c_write(i2c.as_ptr(), address, data.as_ptr(), len) }
    }

    fn i2c_read(&self, i2c: NativeHandle, address: u8, buf: &mut [u8]) -> i32 {
        let len = try_ret!(c_len(buf.len()));
        // SAFETY: `buf` is valid for writes of `len` bytes.
        unsafe { pinion_i2c_read(i2c.as_ptr(), address, buf.as_mut_ptr(), len) }
    }

    fn i2c_write_read(&self, i2c: NativeHandle, address: u8, write: &[u8], read: &mut [u8]) -> i32 {
        let w_len = try_ret!(c_len(write.len()));
        let r_len = try_ret!(c_len(read.len()));
        // SAFETY: both buffers are valid for their lengths.
        unsafe {
            pinion_i2c_write_read(
                i2c.as_ptr(),
                address,
                write.as_ptr(),
                w_len,
                read.as_mut_ptr(),
                r_len,
            )
        }
    }
}

impl SpiHal for NativeHal {
    fn spi_device_count(&self) -> u32 {
        // SAFETY: pure query.
        count(unsafe { pinion_spi_dev_number_get() })
    }

    fn spi_open(&self, id: u8, speed_hz: u32, operation: u16) -> Option<NativeHandle> {
        let speed = c_int::try_from(speed_hz).ok()?;
        // SAFETY: plain integer arguments.
        NativeHandle::from_raw(unsafe { pinion_spi_open(c_int::from(id), speed, operation) })
    }

    fn spi_close(&self, spi: NativeHandle) -> i32 {
        // SAFETY: `spi` is an open handle, closed once.
        unsafe { pinion_spi_close(spi.as_ptr()) }
    }

    fn spi_configure(&self, spi: NativeHandle, speed_hz: u32, operation: u16) -> i32 {
        let speed = try_ret!(c_int::try_from(speed_hz).map_err(|_| Errno::EINVAL.as_ret()));
        // SAFETY: `spi` is an open handle.
        unsafe { pinion_spi_config(spi.as_ptr(), speed, operation) }
    }

    fn spi_write(&self, spi: NativeHandle, data: &[u8]) -> i32 {
        let len = try_ret!(c_len(data.len()));
        // SAFETY: `data` is valid for `len` bytes.
        unsafe { pinion_spi_write(spi.as_ptr(), data.as_ptr(), len) }
    }

    fn spi_read(&self, spi: NativeHandle, buf: &mut [u8]) -> i32 {
        let len = try_ret!(c_len(buf.len()));
        // SAFETY: `buf` is valid for writes of `len` bytes.
        unsafe { pinion_spi_read(spi.as_ptr(), buf.as_mut_ptr(), len) }
    }

    fn spi_transceive(&self, spi: NativeHandle, write: &[u8], read: &mut [u8]) -> i32 {
        let w_len = try_ret!(c_len(write.len()));
        let r_len = try_ret!(c_len(read.len()));
        // SAFETY: both buffers are valid for their lengths.
        unsafe {
            pinion_spi_transceive(spi.as_ptr(), write.as_ptr(), w_len, read.as_mut_ptr(), r_len)
        }
    }
}

impl UartHal for NativeHal {
    fn uart_device_count(&self) -> u32 {
        // SAFETY: pure query.
        count(unsafe { pinion_uart_dev_number_get() })
    }

    fn uart_open(&self, id: u8, config: &RawUartConfig) -> Option<NativeHandle> {
        // SAFETY: `config` is a valid `repr(C)` record for the duration of the call.
        NativeHandle::from_raw(unsafe { pinion_uart_open(c_int::from(id), config) })
    }

    fn uart_close(&self, uart: NativeHandle) -> i32 {
        // SAFETY: `uart` is an open handle, closed once.
        unsafe { pinion_uart_close(uart.as_ptr()) }
    }

    fn uart_configure(&self, uart: NativeHandle, config: &RawUartConfig) -> i32 {
        // SAFETY: `config` is a valid `repr(C)` record.
        unsafe { pinion_uart_config(uart.as_ptr(), config) }
    }

    fn uart_put_byte(&self, uart: NativeHandle, byte: u8) -> i32 {
        // SAFETY: `uart` is an open handle.
        unsafe { pinion_uart_char_put(uart.as_ptr(), byte) }
    }

    fn uart_get_byte(&self, uart: NativeHandle, timeout: i32) -> i32 {
        let mut byte = 0u8;
        // SAFETY: `byte` is a valid out-parameter.
        let ret = unsafe { pinion_uart_char_get(uart.as_ptr(), &mut byte, timeout) };
        if ret < 0 {
            ret
        } else {
            i32::from(byte)
        }
    }

    fn uart_write(&self, uart: NativeHandle, data: &[u8]) -> i32 {
        let len = try_ret!(c_len(data.len()));
        // SAFETY: `data` is valid for `len` bytes.
        unsafe { pinion_uart_write(uart.as_ptr(), data.as_ptr(), len) }
    }

    fn uart_read(&self, uart: NativeHandle, buf: &mut [u8], timeout: i32) -> i32 {
        let len = try_ret!(c_len(buf.len()));
        // SAFETY: `buf` is valid for writes of `len` bytes.
        unsafe { pinion_uart_read(uart.as_ptr(), buf.as_mut_ptr(), len, timeout) }
    }

    fn uart_available(&self, uart: NativeHandle) -> i32 {
        // SAFETY: `uart` is an open handle.
        unsafe { pinion_uart_remainder_get(uart.as_ptr()) }
    }

    fn uart_clear(&self, uart: NativeHandle) -> i32 {
        // SAFETY: `uart` is an open handle.
        unsafe { pinion_uart_buffer_clear(uart.as_ptr()) }
    }
}

impl I2sHal for NativeHal {
    fn i2s_device_count(&self) -> u32 {
        // SAFETY: pure query.
        count(unsafe { pinion_i2s_dev_number_get() })
    }

    fn i2s_handle_get(&self, id: u8) -> Option<NativeHandle> {
        // SAFETY: plain integer argument.
        NativeHandle::from_raw(unsafe { pinion_i2s_handle_get(c_int::from(id)) })
    }

    fn i2s_open(&self, id: u8) -> Option<NativeHandle> {
        // SAFETY: plain integer argument.
        NativeHandle::from_raw(unsafe { pinion_i2s_open(c_int::from(id)) })
    }

    fn i2s_close(&self, i2s: NativeHandle) -> i32 {
        // SAFETY: `i2s` is an open handle, closed once by its last user.
        unsafe { pinion_i2s_close(i2s.as_ptr()) }
    }

    fn i2s_configure(&self, i2s: NativeHandle, dir: I2sDirection, config: &RawI2sConfig) -> i32 {
        // SAFETY: `config` is a valid `repr(C)` record.
        unsafe { pinion_i2s_config_set(i2s.as_ptr(), dir as c_int, config) }
    }

    fn i2s_trigger(&self, i2s: NativeHandle, dir: I2sDirection, cmd: I2sTrigger) -> i32 {
        // SAFETY: `i2s` is an open handle.
        unsafe { pinion_i2s_trigger(i2s.as_ptr(), dir as c_int, cmd as c_int) }
    }

    fn i2s_status(&self, i2s: NativeHandle, dir: I2sDirection) -> i32 {
        // SAFETY: `i2s` is an open handle.
        unsafe { pinion_i2s_status_get(i2s.as_ptr(), dir as c_int) }
    }

    fn i2s_write(&self, i2s: NativeHandle, data: &[u8]) -> i32 {
        let len = try_ret!(c_len(data.len()));
        // SAFETY: `data` is valid for `len` bytes.
        unsafe { pinion_i2s_write(i2s.as_ptr(), data.as_ptr(), len) }
    }

    fn i2s_read(&self, i2s: NativeHandle, buf: &mut [u8], timeout: i32) -> i32 {
        let len = try_ret!(c_len(buf.len()));
        // SAFETY: `buf` is valid for writes of `len` bytes.
        unsafe { pinion_i2s_read(i2s.as_ptr(), buf.as_mut_ptr(), len, timeout) }
    }
}

impl OsHal for NativeHal {
    unsafe fn task_create(
        &self,
        name: &str,
        entry: TaskEntry,
        p1: *mut c_void,
        p2: *mut c_void,
        p3: *mut c_void,
        priority: i32,
        stack_size: u32,
    ) -> Option<NativeHandle> {
        let name = c_path(name).ok()?;
        let stack = c_int::try_from(stack_size).ok()?;
        // SAFETY: the caller guarantees the parameters are valid on the new
        // thread; `name` is NUL-terminated and copied by the RTOS.
        NativeHandle::from_raw(unsafe {
            pinion_os_task_create(name.as_ptr().cast(), entry, p1, p2, p3, priority, stack)
        })
    }

    fn task_yield(&self) {
        // SAFETY: no arguments.
        unsafe { pinion_os_task_yield() }
    }

    fn mq_create(&self, msg_size: u32, capacity: u32) -> Option<NativeHandle> {
        let size = c_int::try_from(msg_size).ok()?;
        let num = c_int::try_from(capacity).ok()?;
        // SAFETY: plain integer arguments.
        NativeHandle::from_raw(unsafe { pinion_os_mq_create(size, num) })
    }

    fn mq_destroy(&self, mq: NativeHandle) -> i32 {
        // SAFETY: `mq` is a live queue, destroyed once.
        unsafe { pinion_os_mq_destroy(mq.as_ptr()) }
    }

    fn mq_send(&self, mq: NativeHandle, msg: &[u8], timeout: i32) -> i32 {
        // SAFETY: the wrapper passes exactly `msg_size` bytes.
        unsafe { pinion_os_mq_send(mq.as_ptr(), msg.as_ptr().cast(), timeout) }
    }

    fn mq_recv(&self, mq: NativeHandle, msg: &mut [u8], timeout: i32) -> i32 {
        // SAFETY: the wrapper passes a `msg_size` buffer.
        unsafe { pinion_os_mq_recv(mq.as_ptr(), msg.as_mut_ptr().cast(), timeout) }
    }

    fn mq_peek(&self, mq: NativeHandle, msg: &mut [u8]) -> i32 {
        // SAFETY: the wrapper passes a `msg_size` buffer.
        unsafe { pinion_os_mq_peek(mq.as_ptr(), msg.as_mut_ptr().cast()) }
    }

    fn mq_purge(&self, mq: NativeHandle) -> i32 {
        // SAFETY: `mq` is a live queue.
        unsafe { pinion_os_mq_purge(mq.as_ptr()) }
    }

    fn mutex_create(&self) -> Option<NativeHandle> {
        // SAFETY: no arguments.
        NativeHandle::from_raw(unsafe { pinion_os_mutex_create() })
    }

    fn mutex_destroy(&self, mutex: NativeHandle) -> i32 {
        // SAFETY: `mutex` is live, destroyed once.
        unsafe { pinion_os_mutex_destroy(mutex.as_ptr()) }
    }

    fn mutex_lock(&self, mutex: NativeHandle, timeout: i32) -> i32 {
        // SAFETY: `mutex` is live.
        unsafe { pinion_os_mutex_lock(mutex.as_ptr(), timeout) }
    }

    fn mutex_unlock(&self, mutex: NativeHandle) -> i32 {
        // SAFETY: `mutex` is live.
        unsafe { pinion_os_mutex_unlock(mutex.as_ptr()) }
    }

    fn sem_create(&self, initial: u32, limit: u32) -> Option<NativeHandle> {
        // SAFETY: plain integer arguments.
        NativeHandle::from_raw(unsafe { pinion_os_sem_create(initial, limit) })
    }

    fn sem_destroy(&self, sem: NativeHandle) -> i32 {
        // SAFETY: `sem` is live, destroyed once.
        unsafe { pinion_os_sem_destroy(sem.as_ptr()) }
    }

    fn sem_take(&self, sem: NativeHandle, timeout: i32) -> i32 {
        // SAFETY: `sem` is live.
        unsafe { pinion_os_sem_take(sem.as_ptr(), timeout) }
    }

    fn sem_give(&self, sem: NativeHandle) -> i32 {
        // SAFETY: `sem` is live.
        unsafe { pinion_os_sem_give(sem.as_ptr()) }
    }

    fn sem_reset(&self, sem: NativeHandle) -> i32 {
        // SAFETY: `sem` is live.
        unsafe { pinion_os_sem_reset(sem.as_ptr()) }
    }
}

impl FsHal for NativeHal {
    fn fs_open(&self, out: &mut Option<NativeHandle>, path: &str, flags: u8) -> i32 {
        let path = try_ret!(c_path(path));
        let mut fp: *mut c_void = core::ptr::null_mut();
        // SAFETY: `path` is NUL-terminated and `fp` is a valid out-parameter.
        let ret = unsafe { pinion_fs_open(&mut fp, path.as_ptr().cast(), flags) };
        *out = NativeHandle::from_raw(fp);
        ret
    }

    fn fs_close(&self, file: NativeHandle) -> i32 {
        // SAFETY: `file` is open, closed once.
        unsafe { pinion_fs_close(file.as_ptr()) }
    }

    fn fs_remove(&self, path: &str) -> i32 {
        let path = try_ret!(c_path(path));
        // SAFETY: `path` is NUL-terminated.
        unsafe { pinion_fs_remove(path.as_ptr().cast()) }
    }

    fn fs_rename(&self, from: &str, to: &str) -> i32 {
        let from = try_ret!(c_path(from));
        let to = try_ret!(c_path(to));
        // SAFETY: both paths are NUL-terminated.
        unsafe { pinion_fs_rename(from.as_ptr().cast(), to.as_ptr().cast()) }
    }

    fn fs_write(&self, file: NativeHandle, data: &[u8]) -> i32 {
        let Ok(len) = isize::try_from(data.len()) else {
            return Errno::EINVAL.as_ret();
        };
        // SAFETY: `data` is valid for `len` bytes.
        unsafe { pinion_fs_write(file.as_ptr(), data.as_ptr().cast(), len) }
    }

    fn fs_read(&self, file: NativeHandle, buf: &mut [u8]) -> i32 {
        let Ok(len) = isize::try_from(buf.len()) else {
            return Errno::EINVAL.as_ret();
        };
        // SAFETY: `buf` is valid for writes of `len` bytes.
        unsafe { pinion_fs_read(file.as_ptr(), buf.as_mut_ptr().cast(), len) }
    }

    fn fs_seek(&self, file: NativeHandle, offset: i64, whence: i32) -> i32 {
        let Ok(offset) = isize::try_from(offset) else {
            return Errno::EOVERFLOW.as_ret();
        };
        // SAFETY: `file` is open.
        unsafe { pinion_fs_seek(file.as_ptr(), offset, whence) }
    }

    fn fs_tell(&self, file: NativeHandle) -> i32 {
        // SAFETY: `file` is open.
        unsafe { pinion_fs_tell(file.as_ptr()) }
    }

    fn fs_truncate(&self, file: NativeHandle, length: u64) -> i32 {
        let Ok(length) = isize::try_from(length) else {
            return Errno::EFBIG.as_ret();
        };
        // SAFETY: `file` is open.
        unsafe { pinion_fs_truncate(file.as_ptr(), length) }
    }

    fn fs_sync(&self, file: NativeHandle) -> i32 {
        // SAFETY: `file` is open.
        unsafe { pinion_fs_sync(file.as_ptr()) }
    }

    fn fs_mkdir(&self, path: &str) -> i32 {
        let path = try_ret!(c_path(path));
        // SAFETY: `path` is NUL-terminated.
        unsafe { pinion_fs_mkdir(path.as_ptr().cast()) }
    }

    fn fs_opendir(&self, out: &mut Option<NativeHandle>, path: &str) -> i32 {
        let path = try_ret!(c_path(path));
        let mut dp: *mut c_void = core::ptr::null_mut();
        // SAFETY: `path` is NUL-terminated and `dp` is a valid out-parameter.
        let ret = unsafe { pinion_fs_opendir(&mut dp, path.as_ptr().cast()) };
        *out = NativeHandle::from_raw(dp);
        ret
    }

    fn fs_readdir(&self, dir: NativeHandle, entry: &mut RawDirEntry) -> i32 {
        let mut raw = CDirent {
            kind: 0,
            name: [0; MAX_NAME_LEN + 1],
            size: 0,
        };
        // SAFETY: `raw` is a valid out-parameter.
        let ret = unsafe { pinion_fs_readdir(dir.as_ptr(), &mut raw) };
        if ret >= 0 {
            dirent_from_c(&raw, entry);
        }
        ret
    }

    fn fs_closedir(&self, dir: NativeHandle) -> i32 {
        // SAFETY: `dir` is open, closed once.
        unsafe { pinion_fs_closedir(dir.as_ptr()) }
    }

    fn fs_stat(&self, path: &str, entry: &mut RawDirEntry) -> i32 {
        let path = try_ret!(c_path(path));
        let mut raw = CDirent {
            kind: 0,
            name: [0; MAX_NAME_LEN + 1],
            size: 0,
        };
        // SAFETY: `path` is NUL-terminated and `raw` is a valid out-parameter.
        let ret = unsafe { pinion_fs_stat(path.as_ptr().cast(), &mut raw) };
        if ret >= 0 {
            dirent_from_c(&raw, entry);
        }
        ret
    }

    fn fs_statfs(&self, path: &str, stat: &mut StatVfs) -> i32 {
        let path = try_ret!(c_path(path));
        let mut raw = CStatVfs {
            f_bsize: 0,
            f_frsize: 0,
            f_blocks: 0,
            f_bfree: 0,
        };
        // SAFETY: `path` is NUL-terminated and `raw` is a valid out-parameter.
        let ret = unsafe { pinion_fs_statfs(path.as_ptr().cast(), &mut raw) };
        if ret >= 0 {
            stat.block_size = u64::from(raw.f_bsize);
            stat.fragment_size = u64::from(raw.f_frsize);
            stat.blocks = u64::from(raw.f_blocks);
            stat.free_blocks = u64::from(raw.f_bfree);
        }
        ret
    }
}

impl EthHal for NativeHal {
    fn eth_setup_mac(&self, mac: &[u8; 6]) -> i32 {
        // SAFETY: `mac` points at six bytes.
        unsafe { pinion_eth_setup_mac(mac.as_ptr()) }
    }

    fn eth_tx_register(&self, send: EthTransmit) -> i32 {
        // SAFETY: `send` is a plain function pointer with static lifetime.
        unsafe { pinion_eth_tx_register(send) }
    }

    fn eth_rx(&self, frame: &[u8]) -> i32 {
        let Ok(len) = c_ushort::try_from(frame.len()) else {
            return Errno::E2BIG.as_ret();
        };
        // SAFETY: `frame` is valid for `len` bytes; the stack copies it.
        unsafe { pinion_eth_rx(frame.as_ptr().cast(), len) }
    }

    fn eth_event_send(&self, event: i32, data: &[u8], timeout: i32) -> i32 {
        let len = try_ret!(c_len(data.len()));
        let ptr = if data.is_empty() {
            core::ptr::null()
        } else {
            data.as_ptr().cast()
        };
        // SAFETY: `data` is valid for `len` bytes and copied by the stack.
        unsafe { pinion_eth_event_send(event, ptr, len, timeout) }
    }
}

impl TimeHal for NativeHal {
    fn sleep_ms(&self, ms: u32) {
        // SAFETY: plain integer argument.
        unsafe { pinion_ms_sleep(c_int::try_from(ms).unwrap_or(c_int::MAX)) }
    }

    fn wait_us(&self, us: u32) {
        // SAFETY: plain integer argument.
        unsafe { pinion_us_wait(us) }
    }

    fn uptime_ms(&self) -> i64 {
        // SAFETY: pure query.
        unsafe { pinion_uptime_get() }
    }

    fn hw_cycles(&self) -> u32 {
        // SAFETY: pure query.
        unsafe { pinion_hwcycle_get() }
    }

    fn cycles_to_ns(&self, cycles: u32) -> u32 {
        // SAFETY: pure conversion.
        unsafe { pinion_hwcycle_to_ns(cycles) }
    }
}
