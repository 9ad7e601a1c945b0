//! Filesystem
//!
//! Files and directory listings are owned handles like any peripheral.
//! Path operations (remove, rename, mkdir, stat, statfs) are free
//! functions taking the HAL.

use pinion_hal::fs::{
    RawDirEntry, MAX_NAME_LEN, O_APPEND, O_CREATE, O_READ, O_WRITE, SEEK_CUR, SEEK_END, SEEK_SET,
};
use pinion_hal::{Errno, FsHal};

pub use embedded_io::SeekFrom;
pub use pinion_hal::fs::{EntryKind, StatVfs};

use crate::error::{check, check_len, Error, Invalid, Peripheral, Result};
use crate::handle::Owned;

/// Access flags for [`File::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpenOptions {
    read: bool,
    write: bool,
    create: bool,
    append: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Create the file when it is missing
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Every write goes to the end of the file
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.read {
            flags |= O_READ;
        }
        if self.write {
            flags |= O_WRITE;
        }
        if self.create {
            flags |= O_CREATE;
        }
        if self.append {
            flags |= O_APPEND;
        }
        flags
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirEntry {
    pub kind: EntryKind,
    pub name: heapless::String<MAX_NAME_LEN>,
    /// Size in bytes, zero for directories
    pub size: u64,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

impl From<RawDirEntry> for DirEntry {
    fn from(raw: RawDirEntry) -> Self {
        Self {
            kind: raw.kind,
            name: raw.name,
            size: raw.size,
        }
    }
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        warn!("empty path");
        return Err(Error::InvalidArgument(Invalid::Path));
    }
    Ok(())
}

fn opened<H: FsHal>(
    hal: &H,
    ret: i32,
    raw: Option<H::Handle>,
    kind: Peripheral,
    release: fn(&H, H::Handle) -> i32,
) -> Result<Owned<H>> {
    check(ret)?;
    match raw {
        Some(raw) => {
            debug!("opened {:?}", kind);
            Ok(Owned::new(hal.clone(), raw, kind, release))
        }
        None => Err(Error::Hal(Errno::EIO)),
    }
}

/// An open file
///
/// Closed on drop.
pub struct File<H: FsHal> {
    handle: Owned<H>,
}

impl<H: FsHal> File<H> {
    pub fn open(hal: &H, path: &str, options: OpenOptions) -> Result<Self> {
        check_path(path)?;
        let mut raw = None;
        let ret = hal.fs_open(&mut raw, path, options.flags());
        let handle = opened(hal, ret, raw, Peripheral::File, H::fs_close)?;
        Ok(Self { handle })
    }

    /// Open an existing file read-only
    pub fn open_read(hal: &H, path: &str) -> Result<Self> {
        Self::open(hal, path, OpenOptions::new().read(true))
    }

    /// Open for writing, creating the file if needed
    pub fn create(hal: &H, path: &str) -> Result<Self> {
        Self::open(hal, path, OpenOptions::new().write(true).create(true))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_len(self.handle.hal().fs_read(self.handle.raw(), buf))
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        check_len(self.handle.hal().fs_write(self.handle.raw(), data))
    }

    /// Move the position and return the new offset from the start
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| Error::Hal(Errno::EOVERFLOW))?,
                SEEK_SET,
            ),
            SeekFrom::Current(n) => (n, SEEK_CUR),
            SeekFrom::End(n) => (n, SEEK_END),
        };
        check(self.handle.hal().fs_seek(self.handle.raw(), offset, whence))?;
        self.tell()
    }

    pub fn tell(&self) -> Result<u64> {
        check(self.handle.hal().fs_tell(self.handle.raw())).map(u64::from)
    }

    /// Cut or zero-extend the file to `length` bytes
    pub fn truncate(&mut self, length: u64) -> Result<()> {
        check(self.handle.hal().fs_truncate(self.handle.raw(), length)).map(|_| ())
    }

    pub fn sync(&mut self) -> Result<()> {
        check(self.handle.hal().fs_sync(self.handle.raw())).map(|_| ())
    }

    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

impl<H: FsHal> embedded_io::ErrorType for File<H> {
    type Error = Error;
}

impl<H: FsHal> embedded_io::Read for File<H> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        File::read(self, buf)
    }
}

impl<H: FsHal> embedded_io::Write for File<H> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        File::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.sync()
    }
}

impl<H: FsHal> embedded_io::Seek for File<H> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        File::seek(self, pos)
    }
}

/// Iterator over the entries of a directory
///
/// The listing handle is closed on drop. Iteration stops after the first
/// error.
pub struct ReadDir<H: FsHal> {
    handle: Owned<H>,
    done: bool,
}

impl<H: FsHal> ReadDir<H> {
    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

impl<H: FsHal> Iterator for ReadDir<H> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut raw = RawDirEntry::default();
        if let Err(e) = check(self.handle.hal().fs_readdir(self.handle.raw(), &mut raw)) {
            self.done = true;
            return Some(Err(e));
        }
        if raw.name.is_empty() {
            self.done = true;
            return None;
        }
        Some(Ok(raw.into()))
    }
}

/// List the directory at `path`
pub fn read_dir<H: FsHal>(hal: &H, path: &str) -> Result<ReadDir<H>> {
    check_path(path)?;
    let mut raw = None;
    let ret = hal.fs_opendir(&mut raw, path);
    let handle = opened(hal, ret, raw, Peripheral::Dir, H::fs_closedir)?;
    Ok(ReadDir {
        handle,
        done: false,
    })
}

/// Remove a file or an empty directory
pub fn remove<H: FsHal>(hal: &H, path: &str) -> Result<()> {
    check_path(path)?;
    check(hal.fs_remove(path)).map(|_| ())
}

pub fn rename<H: FsHal>(hal: &H, from: &str, to: &str) -> Result<()> {
    check_path(from)?;
    check_path(to)?;
    check(hal.fs_rename(from, to)).map(|_| ())
}

pub fn mkdir<H: FsHal>(hal: &H, path: &str) -> Result<()> {
    check_path(path)?;
    check(hal.fs_mkdir(path)).map(|_| ())
}

/// Describe the file or directory at `path`
pub fn stat<H: FsHal>(hal: &H, path: &str) -> Result<DirEntry> {
    check_path(path)?;
    let mut raw = RawDirEntry::default();
    check(hal.fs_stat(path, &mut raw))?;
    Ok(raw.into())
}

/// Capacity of the filesystem holding `path`
pub fn statfs<H: FsHal>(hal: &H, path: &str) -> Result<StatVfs> {
    check_path(path)?;
    let mut stat = StatVfs::default();
    check(hal.fs_statfs(path, &mut stat))?;
    Ok(stat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use pinion_hal_sim::SimHal;

    #[test]
    fn test_write_then_read_back() {
        let sim = SimHal::new();
        let mut file = File::create(&sim, "/log.txt").unwrap();
        assert_eq!(file.write(b"hello world").unwrap(), 11);
        file.close().unwrap();
        assert_eq!(sim.fs_contents("/log.txt").unwrap(), b"hello world");

        let mut file = File::open_read(&sim, "/log.txt").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(file.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(file.tell().unwrap(), 5);
    }

    #[test]
    fn test_seek_whence() {
        let sim = SimHal::new();
        let mut file = File::open(
            &sim,
            "/data.bin",
            OpenOptions::new().read(true).write(true).create(true),
        )
        .unwrap();
        file.write(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(file.seek(SeekFrom::Start(2)).unwrap(), 2);
        assert_eq!(file.seek(SeekFrom::Current(3)).unwrap(), 5);
        assert_eq!(file.seek(SeekFrom::End(-1)).unwrap(), 7);
        let mut b = [0u8; 1];
        file.read(&mut b).unwrap();
        assert_eq!(b[0], 7);
        assert_eq!(
            file.seek(SeekFrom::Current(-100)),
            Err(Error::Hal(Errno::EINVAL))
        );
    }

    #[test]
    fn test_append_and_truncate() {
        let sim = SimHal::new();
        let mut file = File::create(&sim, "/a").unwrap();
        file.write(b"abc").unwrap();
        file.truncate(1).unwrap();
        file.sync().unwrap();
        drop(file);
        assert_eq!(sim.fs_contents("/a").unwrap(), b"a");

        let options = OpenOptions::new().write(true).append(true);
        let mut file = File::open(&sim, "/a", options).unwrap();
        file.write(b"z").unwrap();
        drop(file);
        assert_eq!(sim.fs_contents("/a").unwrap(), b"az");
    }

    #[test]
    fn test_missing_file_and_empty_path() {
        let sim = SimHal::new();
        assert_eq!(
            File::open_read(&sim, "/nope").err(),
            Some(Error::Hal(Errno::ENOENT))
        );
        assert_eq!(
            File::open_read(&sim, "").err(),
            Some(Error::InvalidArgument(Invalid::Path))
        );
        assert_eq!(sim.calls("fs_open"), 1);
        assert_eq!(sim.open_handles(), 0);
    }

    #[test]
    fn test_read_only_rejects_write() {
        let sim = SimHal::new();
        File::create(&sim, "/ro").unwrap();
        let mut file = File::open_read(&sim, "/ro").unwrap();
        assert_eq!(file.write(b"x"), Err(Error::Hal(Errno::EBADF)));
    }

    #[test]
    fn test_directory_listing() {
        let sim = SimHal::new();
        mkdir(&sim, "/etc").unwrap();
        File::create(&sim, "/etc/a.conf")
            .unwrap()
            .write(b"1234")
            .unwrap();
        mkdir(&sim, "/etc/sub").unwrap();
        assert_eq!(mkdir(&sim, "/etc"), Err(Error::Hal(Errno::EEXIST)));

        let mut entries: Vec<DirEntry> = read_dir(&sim, "/etc")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name.as_str(), "a.conf");
        assert_eq!(entries[0].size, 4);
        assert!(!entries[0].is_dir());
        assert_eq!(entries[1].name.as_str(), "sub");
        assert!(entries[1].is_dir());

        assert_eq!(sim.calls("fs_closedir"), 1);
        assert_eq!(sim.open_handles(), 0);
    }

    #[test]
    fn test_read_dir_of_file() {
        let sim = SimHal::new();
        File::create(&sim, "/f").unwrap();
        assert_eq!(
            read_dir(&sim, "/f").err(),
            Some(Error::Hal(Errno::ENOTDIR))
        );
    }

    #[test]
    fn test_rename_remove_stat() {
        let sim = SimHal::new();
        File::create(&sim, "/old").unwrap().write(b"xy").unwrap();
        rename(&sim, "/old", "/new").unwrap();
        assert!(sim.fs_contents("/old").is_none());
        let entry = stat(&sim, "/new").unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 2);

        remove(&sim, "/new").unwrap();
        assert_eq!(stat(&sim, "/new"), Err(Error::Hal(Errno::ENOENT)));

        mkdir(&sim, "/d").unwrap();
        File::create(&sim, "/d/x").unwrap();
        assert_eq!(remove(&sim, "/d"), Err(Error::Hal(Errno::ENOTEMPTY)));
    }

    #[test]
    fn test_statfs_tracks_usage() {
        let sim = SimHal::new();
        let before = statfs(&sim, "/").unwrap();
        assert!(before.block_size > 0);
        let mut file = File::create(&sim, "/big").unwrap();
        file.write(&[0u8; 4096]).unwrap();
        let after = statfs(&sim, "/").unwrap();
        assert!(after.free_blocks < before.free_blocks);
        assert_eq!(after.blocks, before.blocks);
    }

    #[test]
    fn test_embedded_io() {
        use embedded_io::{Read, Seek, Write};
        let sim = SimHal::new();
        let mut file = File::open(
            &sim,
            "/io",
            OpenOptions::new().read(true).write(true).create(true),
        )
        .unwrap();
        file.write_all(b"payload").unwrap();
        file.flush().unwrap();
        file.rewind().unwrap();
        let mut buf = [0u8; 7];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }
}
