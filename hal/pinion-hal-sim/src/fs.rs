//! In-memory filesystem
//!
//! A flat map from absolute path to node. `/` always exists. Renaming a
//! directory moves everything below it.

use std::collections::{BTreeMap, HashMap, VecDeque};

use pinion_hal::fs::{
    EntryKind, FsHal, RawDirEntry, StatVfs, MAX_NAME_LEN, O_APPEND, O_CREATE, O_MASK,
    O_MODE_MASK, O_READ, O_WRITE, SEEK_CUR, SEEK_END, SEEK_SET,
};
use pinion_hal::Errno;

use crate::{enter, SimHal, SimHandle};

/// Block size reported by `fs_statfs`
pub const BLOCK_SIZE: u64 = 4096;
/// Total blocks of the simulated volume
pub const BLOCK_COUNT: u64 = 256;

enum Node {
    File(Vec<u8>),
    Dir,
}

struct OpenFile {
    path: String,
    pos: u64,
    flags: u8,
}

pub(crate) struct FsBank {
    nodes: BTreeMap<String, Node>,
    files: HashMap<SimHandle, OpenFile>,
    dirs: HashMap<SimHandle, VecDeque<RawDirEntry>>,
}

impl Default for FsBank {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_owned(), Node::Dir);
        Self {
            nodes,
            files: HashMap::new(),
            dirs: HashMap::new(),
        }
    }
}

/// Canonical form of an absolute path: no empty, `.` or trailing segments
fn normalize(path: &str) -> Result<String, Errno> {
    if !path.starts_with('/') {
        return Err(Errno::EINVAL);
    }
    let mut out = String::new();
    for seg in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if seg == ".." || seg.len() > MAX_NAME_LEN {
            return Err(Errno::EINVAL);
        }
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

fn is_below(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path != "/";
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

fn entry(path: &str, node: &Node) -> RawDirEntry {
    let mut e = RawDirEntry::default();
    e.name.push_str(base_name(path)).ok();
    match node {
        Node::File(data) => {
            e.kind = EntryKind::File;
            e.size = data.len() as u64;
        }
        Node::Dir => e.kind = EntryKind::Dir,
    }
    e
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

impl FsBank {
    pub(crate) fn len(&self) -> usize {
        self.files.len() + self.dirs.len()
    }

    fn parent_is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(parent(path)), Some(Node::Dir))
    }

    fn children(&self, dir: &str) -> impl Iterator<Item = (&String, &Node)> {
        let dir = dir.to_owned();
        self.nodes
            .iter()
            .filter(move |(p, _)| is_below(p, &dir) && parent(p) == dir)
    }

    fn used_blocks(&self) -> u64 {
        self.nodes
            .values()
            .map(|n| match n {
                Node::File(data) => (data.len() as u64).div_ceil(BLOCK_SIZE).max(1),
                Node::Dir => 1,
            })
            .sum()
    }
}

macro_rules! path {
    ($path:expr) => {
        match normalize($path) {
            Ok(p) => p,
            Err(errno) => return errno.as_ret(),
        }
    };
}

macro_rules! file {
    ($state:expr, $handle:expr) => {
        match $state.fs.files.get_mut(&$handle) {
            Some(f) => f,
            None => return $state.bad_handle(),
        }
    };
}

impl FsHal for SimHal {
    fn fs_open(&self, out: &mut Option<SimHandle>, path: &str, flags: u8) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_open");
        *out = None;
        let path = path!(path);
        if flags & !O_MASK != 0 || flags & O_MODE_MASK == 0 {
            return Errno::EINVAL.as_ret();
        }
        let existing = s.fs.nodes.get(&path).map(|n| matches!(n, Node::Dir));
        match existing {
            Some(true) => return Errno::EISDIR.as_ret(),
            Some(false) => {}
            None if flags & O_CREATE == 0 || !s.fs.parent_is_dir(&path) => {
                return Errno::ENOENT.as_ret()
            }
            None => {
                s.fs.nodes.insert(path.clone(), Node::File(Vec::new()));
            }
        }
        let handle = s.alloc();
        s.fs.files.insert(handle, OpenFile { path, pos: 0, flags });
        *out = Some(handle);
        0
    }

    fn fs_close(&self, file: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_close");
        match s.fs.files.remove(&file) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn fs_remove(&self, path: &str) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_remove");
        let path = path!(path);
        if path == "/" {
            return Errno::EBUSY.as_ret();
        }
        if !s.fs.nodes.contains_key(&path) {
            return Errno::ENOENT.as_ret();
        }
        if s.fs.children(&path).next().is_some() {
            return Errno::ENOTEMPTY.as_ret();
        }
        s.fs.nodes.remove(&path);
        0
    }

    fn fs_rename(&self, from: &str, to: &str) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_rename");
        let from = path!(from);
        let to = path!(to);
        if from == "/" || is_below(&to, &from) {
            return Errno::EINVAL.as_ret();
        }
        if !s.fs.nodes.contains_key(&from) {
            return Errno::ENOENT.as_ret();
        }
        if !s.fs.parent_is_dir(&to) {
            return Errno::ENOENT.as_ret();
        }
        if let Some(Node::Dir) = s.fs.nodes.get(&to) {
            if s.fs.children(&to).next().is_some() {
                return Errno::ENOTEMPTY.as_ret();
            }
        }
        let moved: Vec<String> = s
            .fs
            .nodes
            .keys()
            .filter(|p| **p == from || is_below(p, &from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = s.fs.nodes.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                s.fs.nodes.insert(new, node);
            }
        }
        for f in s.fs.files.values_mut() {
            if f.path == from || is_below(&f.path, &from) {
                f.path = format!("{to}{}", &f.path[from.len()..]);
            }
        }
        0
    }

    fn fs_write(&self, file: SimHandle, data: &[u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_write");
        let f = file!(s, file);
        if f.flags & O_WRITE == 0 {
            return Errno::EBADF.as_ret();
        }
        let (path, append) = (f.path.clone(), f.flags & O_APPEND != 0);
        let pos = f.pos;
        let Some(Node::File(content)) = s.fs.nodes.get_mut(&path) else {
            return Errno::ENOENT.as_ret();
        };
        let start = if append { content.len() } else { pos as usize };
        let end = start + data.len();
        if end > content.len() {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);
        if let Some(f) = s.fs.files.get_mut(&file) {
            f.pos = end as u64;
        }
        count(data.len())
    }

    fn fs_read(&self, file: SimHandle, buf: &mut [u8]) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_read");
        let f = file!(s, file);
        if f.flags & O_READ == 0 {
            return Errno::EBADF.as_ret();
        }
        let (path, pos) = (f.path.clone(), f.pos as usize);
        let Some(Node::File(content)) = s.fs.nodes.get(&path) else {
            return Errno::ENOENT.as_ret();
        };
        let n = content.len().saturating_sub(pos).min(buf.len());
        buf[..n].copy_from_slice(&content[pos..pos + n]);
        if let Some(f) = s.fs.files.get_mut(&file) {
            f.pos += n as u64;
        }
        count(n)
    }

    fn fs_seek(&self, file: SimHandle, offset: i64, whence: i32) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_seek");
        let (path, pos) = {
            let f = file!(s, file);
            (f.path.clone(), f.pos)
        };
        let len = match s.fs.nodes.get(&path) {
            Some(Node::File(content)) => content.len() as i64,
            _ => return Errno::ENOENT.as_ret(),
        };
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => pos as i64,
            SEEK_END => len,
            _ => return Errno::EINVAL.as_ret(),
        };
        let Some(target) = base.checked_add(offset).filter(|t| *t >= 0) else {
            return Errno::EINVAL.as_ret();
        };
        let f = file!(s, file);
        f.pos = target as u64;
        0
    }

    fn fs_tell(&self, file: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_tell");
        let f = file!(s, file);
        i32::try_from(f.pos).unwrap_or(Errno::EOVERFLOW.as_ret())
    }

    fn fs_truncate(&self, file: SimHandle, length: u64) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_truncate");
        let f = file!(s, file);
        if f.flags & O_WRITE == 0 {
            return Errno::EBADF.as_ret();
        }
        let path = f.path.clone();
        match s.fs.nodes.get_mut(&path) {
            Some(Node::File(content)) => {
                content.resize(length as usize, 0);
                0
            }
            _ => Errno::ENOENT.as_ret(),
        }
    }

    fn fs_sync(&self, file: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_sync");
        if !s.fs.files.contains_key(&file) {
            return s.bad_handle();
        }
        0
    }

    fn fs_mkdir(&self, path: &str) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_mkdir");
        let path = path!(path);
        if s.fs.nodes.contains_key(&path) {
            return Errno::EEXIST.as_ret();
        }
        if !s.fs.parent_is_dir(&path) {
            return Errno::ENOENT.as_ret();
        }
        s.fs.nodes.insert(path, Node::Dir);
        0
    }

    fn fs_opendir(&self, out: &mut Option<SimHandle>, path: &str) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_opendir");
        *out = None;
        let path = path!(path);
        match s.fs.nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Errno::ENOTDIR.as_ret(),
            None => return Errno::ENOENT.as_ret(),
        }
        let listing = s.fs.children(&path).map(|(p, n)| entry(p, n)).collect();
        let handle = s.alloc();
        s.fs.dirs.insert(handle, listing);
        *out = Some(handle);
        0
    }

    fn fs_readdir(&self, dir: SimHandle, out: &mut RawDirEntry) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_readdir");
        let Some(listing) = s.fs.dirs.get_mut(&dir) else {
            return s.bad_handle();
        };
        *out = listing.pop_front().unwrap_or_default();
        0
    }

    fn fs_closedir(&self, dir: SimHandle) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_closedir");
        match s.fs.dirs.remove(&dir) {
            Some(_) => 0,
            None => s.bad_handle(),
        }
    }

    fn fs_stat(&self, path: &str, out: &mut RawDirEntry) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_stat");
        let path = path!(path);
        match s.fs.nodes.get(&path) {
            Some(node) => {
                *out = entry(&path, node);
                0
            }
            None => Errno::ENOENT.as_ret(),
        }
    }

    fn fs_statfs(&self, path: &str, out: &mut StatVfs) -> i32 {
        let mut s = self.lock();
        enter!(s, "fs_statfs");
        let path = path!(path);
        if !s.fs.nodes.contains_key(&path) {
            return Errno::ENOENT.as_ret();
        }
        *out = StatVfs {
            block_size: BLOCK_SIZE,
            fragment_size: BLOCK_SIZE,
            blocks: BLOCK_COUNT,
            free_blocks: BLOCK_COUNT.saturating_sub(s.fs.used_blocks()),
        };
        0
    }
}

impl SimHal {
    /// Contents of the file at `path`
    pub fn fs_contents(&self, path: &str) -> Option<Vec<u8>> {
        let path = normalize(path).ok()?;
        match self.lock().fs.nodes.get(&path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(sim: &SimHal, path: &str, flags: u8) -> Result<SimHandle, i32> {
        let mut out = None;
        match sim.fs_open(&mut out, path, flags) {
            0 => Ok(out.unwrap()),
            err => Err(err),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c/").unwrap(), "/a/b/c");
        assert_eq!(normalize("/").unwrap(), "/");
        assert!(normalize("relative").is_err());
        assert!(normalize("/a/../b").is_err());
    }

    #[test]
    fn test_open_requires_create() {
        let sim = SimHal::new();
        assert_eq!(open(&sim, "/x.txt", O_READ), Err(Errno::ENOENT.as_ret()));
        assert_eq!(
            open(&sim, "/missing/x.txt", O_WRITE | O_CREATE),
            Err(Errno::ENOENT.as_ret())
        );
        assert!(open(&sim, "/x.txt", O_WRITE | O_CREATE).is_ok());
    }

    #[test]
    fn test_append_and_seek() {
        let sim = SimHal::new();
        let f = open(&sim, "/log", O_WRITE | O_CREATE | O_APPEND).unwrap();
        sim.fs_write(f, b"ab");
        sim.fs_seek(f, 0, SEEK_SET);
        sim.fs_write(f, b"cd");
        assert_eq!(sim.fs_contents("/log").unwrap(), b"abcd");
        sim.fs_close(f);
    }

    #[test]
    fn test_rename_dir_moves_children() {
        let sim = SimHal::new();
        sim.fs_mkdir("/a");
        let f = open(&sim, "/a/f", O_RDWR_CREATE).unwrap();
        sim.fs_close(f);
        assert_eq!(sim.fs_rename("/a", "/b"), 0);
        assert!(sim.fs_contents("/b/f").is_some());
        assert!(sim.fs_contents("/a/f").is_none());
        assert_eq!(sim.fs_remove("/b"), Errno::ENOTEMPTY.as_ret());
    }

    const O_RDWR_CREATE: u8 = O_READ | O_WRITE | O_CREATE;
}
