//! In-memory file system.
//!
//! A single flat directory of regular files whose contents live in memory.
//! Every file keeps its bytes behind its own [`SpinLock`], so transfers on
//! one file are atomic with respect to each other; ordering between
//! transfers is left to the caller.

use super::{Directory, InodeNumber, RegularFile, traits};
use crate::{KernelError, sync::SpinLock};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU32, Ordering},
};

/// Longest entry name accepted by the file system.
pub const NAME_MAX: usize = 255;
/// Largest size a file can grow to.
pub const MAX_FILE_SIZE: usize = 64 << 20;

const ROOT_INO: InodeNumber = match InodeNumber::new(1) {
    Some(ino) => ino,
    None => unreachable!(),
};

/// An in-memory file system.
pub struct RamFs {
    root: Directory,
}

impl RamFs {
    /// Creates an empty file system.
    pub fn new() -> Self {
        Self {
            root: Directory::new(RamDirectory {
                ino: ROOT_INO,
                next_ino: AtomicU32::new(2),
                entries: SpinLock::new(BTreeMap::new()),
            }),
        }
    }

    /// The root directory.
    pub fn root(&self) -> Directory {
        self.root.clone()
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

struct RamDirectory {
    ino: InodeNumber,
    next_ino: AtomicU32,
    entries: SpinLock<BTreeMap<String, RegularFile>>,
}

fn check_name(entry: &str) -> Result<(), KernelError> {
    if entry.is_empty() || entry.contains('/') {
        Err(KernelError::InvalidArgument)
    } else if entry.len() > NAME_MAX {
        Err(KernelError::NameTooLong)
    } else {
        Ok(())
    }
}

impl traits::Directory for RamDirectory {
    fn ino(&self) -> InodeNumber {
        self.ino
    }

    fn open_entry(&self, entry: &str) -> Result<RegularFile, KernelError> {
        check_name(entry)?;
        let entries = self.entries.lock();
        let file = entries.get(entry).cloned();
        entries.unlock();
        file.ok_or(KernelError::NoSuchEntry)
    }

    fn create_entry(&self, entry: &str, permission: u32) -> Result<RegularFile, KernelError> {
        check_name(entry)?;
        let mut entries = self.entries.lock();
        if entries.contains_key(entry) {
            entries.unlock();
            return Err(KernelError::FileExist);
        }
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        let Some(ino) = InodeNumber::new(ino) else {
            entries.unlock();
            return Err(KernelError::NoSpace);
        };
        let file = RegularFile::new(RamFile {
            ino,
            permission,
            data: SpinLock::new(Vec::new()),
        });
        entries.insert(entry.to_string(), file.clone());
        entries.unlock();
        Ok(file)
    }

    fn unlink_entry(&self, entry: &str) -> Result<(), KernelError> {
        check_name(entry)?;
        let mut entries = self.entries.lock();
        let removed = entries.remove(entry);
        entries.unlock();
        removed.map(|_| ()).ok_or(KernelError::NoSuchEntry)
    }

    fn read_dir(&self) -> Result<Vec<(InodeNumber, String)>, KernelError> {
        let entries = self.entries.lock();
        let list = entries
            .iter()
            .map(|(name, file)| (file.ino(), name.clone()))
            .collect();
        entries.unlock();
        Ok(list)
    }
}

struct RamFile {
    ino: InodeNumber,
    permission: u32,
    data: SpinLock<Vec<u8>>,
}

impl traits::RegularFile for RamFile {
    fn ino(&self) -> InodeNumber {
        self.ino
    }

    fn permission(&self) -> u32 {
        self.permission
    }

    fn size(&self) -> usize {
        let data = self.data.lock();
        let size = data.len();
        data.unlock();
        size
    }

    fn read_at(&self, position: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
        let data = self.data.lock();
        let read_bytes = data.len().saturating_sub(position).min(buf.len());
        if read_bytes > 0 {
            buf[..read_bytes].copy_from_slice(&data[position..position + read_bytes]);
        }
        data.unlock();
        Ok(read_bytes)
    }

    fn write_at(&self, position: usize, buf: &[u8]) -> Result<usize, KernelError> {
        let end = position
            .checked_add(buf.len())
            .ok_or(KernelError::FileTooLarge)?;
        if end > MAX_FILE_SIZE {
            return Err(KernelError::FileTooLarge);
        }
        let mut data = self.data.lock();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[position..end].copy_from_slice(buf);
        data.unlock();
        Ok(buf.len())
    }

    fn truncate(&self, size: usize) -> Result<(), KernelError> {
        if size > MAX_FILE_SIZE {
            return Err(KernelError::FileTooLarge);
        }
        let mut data = self.data.lock();
        data.resize(size, 0);
        data.unlock();
        Ok(())
    }
}
