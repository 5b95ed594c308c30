//! Filesystem abstraction.
//!
//! The kernel sees storage only through the two traits of [`traits`]: a
//! [`traits::RegularFile`] transfers bytes at an offset and reports its
//! size, and a [`traits::Directory`] maps names to regular files. The
//! reference-counted handles [`RegularFile`] and [`Directory`] are what the
//! rest of the kernel passes around.
//!
//! [`ramfs`] provides an in-memory implementation of both.

pub mod ramfs;

use crate::KernelError;
use std::{num::NonZeroU32, sync::Arc};

/// Defines traits for file system operations.
pub mod traits {
    use super::{InodeNumber, RegularFile as RegularFileHandle, Stat};
    use crate::KernelError;

    /// Trait representing a regular file in the filesystem.
    ///
    /// A regular file contains user data and supports byte-granular read and
    /// write operations at an arbitrary offset.
    pub trait RegularFile
    where
        Self: Send + Sync,
    {
        /// Returns the inode number of the file.
        fn ino(&self) -> InodeNumber;

        /// Returns the size of the file in bytes.
        fn size(&self) -> usize;

        /// Reads data from the file into the provided buffer.
        ///
        /// # Parameters
        /// - `position`: Byte offset to start reading at.
        /// - `buf`: A mutable slice where the file content will be stored.
        ///
        /// # Returns
        /// - `Ok(usize)`: The number of bytes read, which is smaller than
        ///   `buf.len()` at the end of the file.
        /// - `Err(Error)`: An error occured while the read operation.
        fn read_at(&self, position: usize, buf: &mut [u8]) -> Result<usize, KernelError>;

        /// Writes data from the buffer into the file.
        ///
        /// If the write position is beyond the current file size, the file is
        /// extended and the gap reads as zeroes.
        ///
        /// # Returns
        /// - `Ok(usize)`: The number of bytes written.
        /// - `Err(Error)`: An error occured while the write operation.
        fn write_at(&self, position: usize, buf: &[u8]) -> Result<usize, KernelError>;

        /// Changes the size of the file to `size` bytes.
        fn truncate(&self, size: usize) -> Result<(), KernelError>;

        /// Permission bits the file was created with.
        fn permission(&self) -> u32 {
            0o644
        }

        /// Metadata of the file.
        fn stat(&self) -> Stat {
            Stat {
                ino: self.ino(),
                size: self.size(),
                permission: self.permission(),
            }
        }

        /// Flushes buffered contents of the file to the backing store.
        fn writeback(&self) -> Result<(), KernelError> {
            Ok(())
        }
    }

    /// Trait representing a directory of regular files.
    pub trait Directory
    where
        Self: Send + Sync,
    {
        /// Returns the inode number of the directory.
        fn ino(&self) -> InodeNumber;

        /// Opens the entry named `entry`.
        ///
        /// # Returns
        /// - `Err(KernelError::NoSuchEntry)` if there is no such entry.
        fn open_entry(&self, entry: &str) -> Result<RegularFileHandle, KernelError>;

        /// Creates a new empty regular file named `entry`.
        ///
        /// The check for an existing entry and the insertion are one atomic
        /// step.
        ///
        /// # Returns
        /// - `Err(KernelError::FileExist)` if the entry already exists.
        fn create_entry(
            &self,
            entry: &str,
            permission: u32,
        ) -> Result<RegularFileHandle, KernelError>;

        /// Removes the entry named `entry`.
        ///
        /// Open handles of the file keep working.
        fn unlink_entry(&self, entry: &str) -> Result<(), KernelError>;

        /// Lists the entries of the directory.
        fn read_dir(&self) -> Result<Vec<(InodeNumber, String)>, KernelError>;
    }
}

/// Metadata of a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Inode number of the file.
    pub ino: InodeNumber,
    /// Size of the file in bytes.
    pub size: usize,
    /// Permission bits of the file.
    pub permission: u32,
}

/// A handle to a regular file.
///
/// This struct provides a reference-counted handle to a file that supports
/// reading and writing operations at the kernel level.
#[derive(Clone)]
pub struct RegularFile(pub Arc<dyn traits::RegularFile>);

impl RegularFile {
    /// Creates a new [`RegularFile`] handle from a given implementation of
    /// [`traits::RegularFile`].
    pub fn new(r: impl traits::RegularFile + 'static) -> Self {
        Self(Arc::new(r))
    }

    /// Inode number of the file.
    pub fn ino(&self) -> InodeNumber {
        self.0.ino()
    }

    /// Returns the size of the file in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// Metadata of the file.
    #[inline]
    pub fn stat(&self) -> Stat {
        self.0.stat()
    }

    /// Reads data at `position` into `buf`, returning the number of bytes
    /// read.
    #[inline]
    pub fn read(&self, position: usize, buf: &mut [u8]) -> Result<usize, KernelError> {
        self.0.read_at(position, buf)
    }

    /// Writes `buf` at `position`, returning the number of bytes written.
    #[inline]
    pub fn write(&self, position: usize, buf: &[u8]) -> Result<usize, KernelError> {
        self.0.write_at(position, buf)
    }

    /// Changes the size of the file to `size` bytes.
    #[inline]
    pub fn truncate(&self, size: usize) -> Result<(), KernelError> {
        self.0.truncate(size)
    }

    /// Flushes the file to the backing store.
    #[inline]
    pub fn writeback(&self) -> Result<(), KernelError> {
        self.0.writeback()
    }
}

/// A handle to a directory.
#[derive(Clone)]
pub struct Directory(pub Arc<dyn traits::Directory>);

impl Directory {
    /// Creates a new [`Directory`] handle from a given implementation of
    /// [`traits::Directory`].
    pub fn new(r: impl traits::Directory + 'static) -> Self {
        Self(Arc::new(r))
    }

    /// Inode number of the directory.
    pub fn ino(&self) -> InodeNumber {
        self.0.ino()
    }

    /// Opens a path from the directory.
    ///
    /// A leading `/` is accepted and names this directory.
    ///
    /// # Errors
    /// - [`KernelError::NoSuchEntry`] if the path does not exist.
    /// - [`KernelError::IsDirectory`] if the path names the directory itself.
    /// - [`KernelError::NotDirectory`] if the path walks through a regular
    ///   file.
    pub fn open(&self, path: &str) -> Result<RegularFile, KernelError> {
        self.0.open_entry(Self::entry_of(path)?)
    }

    /// Creates a regular file at `path`.
    ///
    /// # Errors
    /// - [`KernelError::FileExist`] if the path already exists.
    pub fn create(&self, path: &str, permission: u32) -> Result<RegularFile, KernelError> {
        self.0.create_entry(Self::entry_of(path)?, permission)
    }

    /// Unlinks the regular file at `path`.
    pub fn unlink(&self, path: &str) -> Result<(), KernelError> {
        self.0.unlink_entry(Self::entry_of(path)?)
    }

    /// Reads the contents of the directory.
    pub fn read_dir(&self) -> Result<Vec<(InodeNumber, String)>, KernelError> {
        self.0.read_dir()
    }

    fn entry_of(path: &str) -> Result<&str, KernelError> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        match (parts.next(), parts.next()) {
            (None, _) => Err(KernelError::IsDirectory),
            (Some(entry), None) => Ok(entry),
            // Directories hold regular files only.
            (Some(_), Some(_)) => Err(KernelError::NotDirectory),
        }
    }
}

/// Represents a unique identifier for an inode in the filesystem.
///
/// An inode number uniquely identifies a file or directory within a filesystem.
/// It is typically used to reference file metadata rather than file names.
#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct InodeNumber(NonZeroU32);

impl InodeNumber {
    /// Creates a [`InodeNumber`] if the given value is not zero.
    pub const fn new(n: u32) -> Option<Self> {
        if let Some(v) = NonZeroU32::new(n) {
            Some(Self(v))
        } else {
            None
        }
    }

    /// Returns the contained value as a u32.
    #[inline]
    pub fn into_u32(&self) -> u32 {
        self.0.get()
    }
}
