//! Error model shared by every wrapper
//!
//! Native failures arrive as `-errno` and are carried as [`Error::Hal`].
//! Everything the wrapper can reject on its own, before touching hardware,
//! is an [`Error::InvalidArgument`].

use core::fmt;

use pinion_hal::Errno;

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

/// Resource families, used to tag open failures and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Peripheral {
    Gpio,
    Adc,
    Pwm,
    Counter,
    Timer,
    I2c,
    Spi,
    Uart,
    I2s,
    File,
    Dir,
    Queue,
    Mutex,
    Semaphore,
    Thread,
}

/// Which argument check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Invalid {
    /// Requested element count exceeds the buffer
    Count { requested: usize, capacity: usize },
    /// PWM frequency outside the range reported by the hardware
    Frequency,
    /// Duty cycle outside `[0, 1]`
    DutyCycle,
    /// Pulse width longer than the period, or a zero period
    PulseWidth,
    /// I2S sample width not in {8, 16, 24, 32}
    SampleBits,
    /// I2S sample rate not a supported audio rate
    SampleRate,
    /// I2S channel count
    Channels,
    /// I2C address outside the 7-bit range
    Address,
    /// Pull/drive mode not valid for the pin direction
    PinMode,
    /// Zero or out-of-range clock/baud/period
    Speed,
    /// Zero-sized receive buffer
    BufferLength,
    /// Timer period of zero
    Period,
    /// Semaphore initial count above its limit, or a zero limit
    SemaphoreCount,
    /// Zero-sized message or zero queue capacity
    QueueSize,
    /// Empty path
    Path,
    /// Frame empty or too long for the Ethernet tap
    Frame,
    /// ADC reported a resolution that cannot be scaled
    Resolution,
}

/// Error returned by every fallible wrapper operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The native layer reported a failure
    Hal(Errno),
    /// Rejected before any native call was made
    InvalidArgument(Invalid),
    /// The native open call returned no handle
    OpenFailed { kind: Peripheral, id: u8 },
    /// `id` is beyond the number of devices the native layer reports
    NoSuchDevice { kind: Peripheral, id: u8 },
    /// Removing or toggling a callback that is not installed
    NotRegistered,
}

impl Error {
    /// Position of this error in the errno space
    pub fn errno(&self) -> Errno {
        match self {
            Error::Hal(errno) => *errno,
            Error::InvalidArgument(_) | Error::NotRegistered => Errno::EINVAL,
            Error::OpenFailed { .. } => Errno::EIO,
            Error::NoSuchDevice { .. } => Errno::ENODEV,
        }
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::Hal(errno)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Hal(errno) => f.write_str(errno.description()),
            Error::InvalidArgument(what) => write!(f, "Invalid argument: {what:?}"),
            Error::OpenFailed { kind, id } => write!(f, "Failed to open {kind:?} {id}"),
            Error::NoSuchDevice { kind, id } => write!(f, "No such device: {kind:?} {id}"),
            Error::NotRegistered => f.write_str("No callback registered"),
        }
    }
}

/// Translate a native return value
pub(crate) fn check(ret: i32) -> Result<u32> {
    pinion_hal::check(ret).map_err(Error::Hal)
}

/// Translate a native return value carrying a byte count
pub(crate) fn check_len(ret: i32) -> Result<usize> {
    check(ret).map(|n| n as usize)
}

/// Validate an optional element count against a buffer length
///
/// `None` means the whole buffer.
pub(crate) fn span(capacity: usize, count: Option<usize>) -> Result<usize> {
    match count {
        None => Ok(capacity),
        Some(requested) if requested <= capacity => Ok(requested),
        Some(requested) => Err(Error::InvalidArgument(Invalid::Count {
            requested,
            capacity,
        })),
    }
}

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        match self.errno() {
            Errno::EIO => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Errno::EBUSY => ErrorKind::ArbitrationLoss,
            _ => ErrorKind::Other,
        }
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;
        if let Error::InvalidArgument(_) = self {
            return ErrorKind::InvalidInput;
        }
        match self.errno() {
            Errno::ETIMEDOUT | Errno::EAGAIN => ErrorKind::TimedOut,
            Errno::ENOENT | Errno::ENODEV => ErrorKind::NotFound,
            Errno::EACCES | Errno::EPERM | Errno::EROFS => ErrorKind::PermissionDenied,
            Errno::EEXIST => ErrorKind::AlreadyExists,
            Errno::EINTR => ErrorKind::Interrupted,
            Errno::ENOMEM => ErrorKind::OutOfMemory,
            Errno::ENOTSUP | Errno::ENOSYS => ErrorKind::Unsupported,
            Errno::EINVAL => ErrorKind::InvalidInput,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_span() {
        assert_eq!(span(4, None), Ok(4));
        assert_eq!(span(4, Some(0)), Ok(0));
        assert_eq!(span(4, Some(4)), Ok(4));
        assert_eq!(
            span(4, Some(5)),
            Err(Error::InvalidArgument(Invalid::Count {
                requested: 5,
                capacity: 4
            }))
        );
    }

    #[test]
    fn test_check_maps_negative() {
        assert_eq!(check(12), Ok(12));
        assert_eq!(check(-5), Err(Error::Hal(Errno::EIO)));
    }

    #[test]
    fn test_display_uses_description() {
        assert_eq!(Error::Hal(Errno::ENODEV).to_string(), Errno::ENODEV.description());
        assert_eq!(Error::NotRegistered.errno(), Errno::EINVAL);
        assert_eq!(
            Error::NoSuchDevice {
                kind: Peripheral::Uart,
                id: 9
            }
            .errno(),
            Errno::ENODEV
        );
    }

    #[test]
    fn test_io_kind() {
        use embedded_io::Error as _;
        assert_eq!(
            Error::Hal(Errno::EAGAIN).kind(),
            embedded_io::ErrorKind::TimedOut
        );
        assert_eq!(
            Error::InvalidArgument(Invalid::Path).kind(),
            embedded_io::ErrorKind::InvalidInput
        );
    }
}
