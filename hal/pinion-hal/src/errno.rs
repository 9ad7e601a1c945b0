//! POSIX-style error codes returned by the native layer
//!
//! Native calls report failure as `-errno`. The numbering follows the
//! newlib/Zephyr errno table used by the target RTOS.

use core::fmt;

/// Positive error code taken from the native errno space
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Errno(u16);

impl Errno {
    /// Operation not permitted
    pub const EPERM: Errno = Errno(1);
    /// No such file or directory
    pub const ENOENT: Errno = Errno(2);
    /// Interrupted system call
    pub const EINTR: Errno = Errno(4);
    /// I/O error
    pub const EIO: Errno = Errno(5);
    /// No such device or address
    pub const ENXIO: Errno = Errno(6);
    /// Argument list too long
    pub const E2BIG: Errno = Errno(7);
    /// Bad file number
    pub const EBADF: Errno = Errno(9);
    /// No more contexts / try again
    pub const EAGAIN: Errno = Errno(11);
    /// Not enough core
    pub const ENOMEM: Errno = Errno(12);
    /// Permission denied
    pub const EACCES: Errno = Errno(13);
    /// Bad address
    pub const EFAULT: Errno = Errno(14);
    /// Mount device busy
    pub const EBUSY: Errno = Errno(16);
    /// File exists
    pub const EEXIST: Errno = Errno(17);
    /// No such device
    pub const ENODEV: Errno = Errno(19);
    /// Not a directory
    pub const ENOTDIR: Errno = Errno(20);
    /// Is a directory
    pub const EISDIR: Errno = Errno(21);
    /// Invalid argument
    pub const EINVAL: Errno = Errno(22);
    /// Too many open files in system
    pub const ENFILE: Errno = Errno(23);
    /// Too many open files
    pub const EMFILE: Errno = Errno(24);
    /// File too large
    pub const EFBIG: Errno = Errno(27);
    /// No space left on device
    pub const ENOSPC: Errno = Errno(28);
    /// Illegal seek
    pub const ESPIPE: Errno = Errno(29);
    /// Read-only file system
    pub const EROFS: Errno = Errno(30);
    /// Result too large
    pub const ERANGE: Errno = Errno(34);
    /// Unexpected message type
    pub const ENOMSG: Errno = Errno(35);
    /// Function not implemented
    pub const ENOSYS: Errno = Errno(88);
    /// Directory not empty
    pub const ENOTEMPTY: Errno = Errno(90);
    /// File name too long
    pub const ENAMETOOLONG: Errno = Errno(91);
    /// Connection timed out
    pub const ETIMEDOUT: Errno = Errno(116);
    /// Operation already in progress
    pub const EALREADY: Errno = Errno(120);
    /// Unsupported value
    pub const ENOTSUP: Errno = Errno(134);
    /// Value overflow
    pub const EOVERFLOW: Errno = Errno(139);
    /// Operation canceled
    pub const ECANCELED: Errno = Errno(140);

    /// Build an errno from its positive code
    ///
    /// Returns `None` for zero, which is not an error.
    pub const fn new(code: u16) -> Option<Self> {
        if code == 0 {
            None
        } else {
            Some(Errno(code))
        }
    }

    /// Build an errno from a negative native return value
    ///
    /// Values that do not fit the errno space collapse to `EIO`.
    pub fn from_ret(ret: i32) -> Self {
        match u16::try_from(ret.unsigned_abs()) {
            Ok(0) | Err(_) => Errno::EIO,
            Ok(code) => Errno(code),
        }
    }

    /// The positive error code
    pub const fn code(self) -> u16 {
        self.0
    }

    /// The value a native call would return for this error
    pub fn as_ret(self) -> i32 {
        -i32::from(self.0)
    }

    /// Human-readable description of the error code
    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "Operation not permitted",
            2 => "No such file or directory",
            4 => "Interrupted system call",
            5 => "I/O error",
            6 => "No such device or address",
            7 => "Argument list too long",
            9 => "Bad file number",
            11 => "Resource temporarily unavailable",
            12 => "Not enough memory",
            13 => "Permission denied",
            14 => "Bad address",
            16 => "Device or resource busy",
            17 => "File exists",
            19 => "No such device",
            20 => "Not a directory",
            21 => "Is a directory",
            22 => "Invalid argument",
            23 => "Too many open files in system",
            24 => "Too many open files",
            27 => "File too large",
            28 => "No space left on device",
            29 => "Illegal seek",
            30 => "Read-only file system",
            34 => "Result too large",
            35 => "No message of desired type",
            88 => "Function not implemented",
            90 => "Directory not empty",
            91 => "File name too long",
            116 => "Connection timed out",
            120 => "Operation already in progress",
            134 => "Not supported",
            139 => "Value too large for defined data type",
            140 => "Operation canceled",
            _ => "Unknown error",
        }
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errno({}: {})", self.0, self.description())
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.description(), self.0)
    }
}

/// Translate a native return value
///
/// Negative values become `Err(abs(ret))`, everything else is returned as
/// the success payload.
pub fn check(ret: i32) -> Result<u32, Errno> {
    if ret < 0 {
        Err(Errno::from_ret(ret))
    } else {
        Ok(ret.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_success_passes_value() {
        assert_eq!(check(0), Ok(0));
        assert_eq!(check(42), Ok(42));
    }

    #[test]
    fn test_check_negative_is_errno() {
        assert_eq!(check(-22), Err(Errno::EINVAL));
        assert_eq!(check(-5), Err(Errno::EIO));
        assert_eq!(check(Errno::ETIMEDOUT.as_ret()), Err(Errno::ETIMEDOUT));
    }

    #[test]
    fn test_out_of_range_collapses_to_eio() {
        assert_eq!(check(i32::MIN), Err(Errno::EIO));
        assert_eq!(check(-70_000), Err(Errno::EIO));
    }

    #[test]
    fn test_zero_is_not_an_errno() {
        assert_eq!(Errno::new(0), None);
        assert_eq!(Errno::new(16), Some(Errno::EBUSY));
    }

    #[test]
    fn test_description() {
        assert_eq!(Errno::EINVAL.description(), "Invalid argument");
        assert_eq!(Errno::new(999).map(Errno::description), Some("Unknown error"));
    }
}
