//! Filesystem boundary
//!
//! Path-based open/read/write with POSIX-like flags and whence values.

use heapless::String;

use crate::Hal;

/// Open for reading
pub const O_READ: u8 = 0x01;
/// Open for writing
pub const O_WRITE: u8 = 0x02;
/// Open for reading and writing
pub const O_RDWR: u8 = O_READ | O_WRITE;
/// Access mode bits
pub const O_MODE_MASK: u8 = 0x03;
/// Create the file if it does not exist
pub const O_CREATE: u8 = 0x10;
/// Move to end of file before every write
pub const O_APPEND: u8 = 0x20;
/// Flag bits
pub const O_FLAGS_MASK: u8 = 0x30;
/// Every valid bit
pub const O_MASK: u8 = O_MODE_MASK | O_FLAGS_MASK;

/// Seek from the start of the file
pub const SEEK_SET: i32 = 0;
/// Seek from the current position
pub const SEEK_CUR: i32 = 1;
/// Seek from the end of the file
pub const SEEK_END: i32 = 2;

/// Longest entry name the native layer reports
pub const MAX_NAME_LEN: usize = 255;

/// Directory entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum EntryKind {
    #[default]
    File = 0,
    Dir = 1,
}

/// Directory entry as filled by `fs_readdir` and `fs_stat`
///
/// An empty name returned by `fs_readdir` marks the end of the directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawDirEntry {
    pub kind: EntryKind,
    pub name: String<MAX_NAME_LEN>,
    /// Size in bytes, zero for directories
    pub size: u64,
}

/// Filesystem statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatVfs {
    /// Optimal transfer block size
    pub block_size: u64,
    /// Allocation unit size
    pub fragment_size: u64,
    /// Size of the filesystem in fragments
    pub blocks: u64,
    /// Number of free fragments
    pub free_blocks: u64,
}

/// Native filesystem calls
///
/// File and directory handles share the [`Hal::Handle`] type but are never
/// interchangeable.
pub trait FsHal: Hal {
    /// Open a file; on success `out` holds the handle
    fn fs_open(&self, out: &mut Option<Self::Handle>, path: &str, flags: u8) -> i32;

    /// Close a file
    fn fs_close(&self, file: Self::Handle) -> i32;

    /// Remove a file or an empty directory
    fn fs_remove(&self, path: &str) -> i32;

    /// Rename a file or directory
    fn fs_rename(&self, from: &str, to: &str) -> i32;

    /// Write `data`; returns the number of bytes written
    fn fs_write(&self, file: Self::Handle, data: &[u8]) -> i32;

    /// Read up to `buf.len()` bytes; returns the number of bytes read
    fn fs_read(&self, file: Self::Handle, buf: &mut [u8]) -> i32;

    /// Move the file position
    fn fs_seek(&self, file: Self::Handle, offset: i64, whence: i32) -> i32;

    /// Current file position
    fn fs_tell(&self, file: Self::Handle) -> i32;

    /// Truncate or extend the file to `length` bytes
    fn fs_truncate(&self, file: Self::Handle, length: u64) -> i32;

    /// Flush cached data
    fn fs_sync(&self, file: Self::Handle) -> i32;

    /// Create a directory
    fn fs_mkdir(&self, path: &str) -> i32;

    /// Open a directory for iteration
    fn fs_opendir(&self, out: &mut Option<Self::Handle>, path: &str) -> i32;

    /// Read the next entry
    fn fs_readdir(&self, dir: Self::Handle, entry: &mut RawDirEntry) -> i32;

    /// Close a directory
    fn fs_closedir(&self, dir: Self::Handle) -> i32;

    /// Describe the entry at `path`
    fn fs_stat(&self, path: &str, entry: &mut RawDirEntry) -> i32;

    /// Statistics of the filesystem holding `path`
    fn fs_statfs(&self, path: &str, stat: &mut StatVfs) -> i32;
}
