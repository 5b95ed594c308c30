//! # Typed system call requests.
//!
//! A [`Syscall`] is one file system call together with its arguments, as
//! the kernel's entry code decoded it. [`Process::syscall`] dispatches the
//! request to the process's [`FileStruct`] and folds the result into one
//! return word:
//!
//! - `Ok(value)` is returned as is (descriptors, byte counts, cursors; `0`
//!   for calls with no value).
//! - `Err(e)` is returned as [`KernelError::into_usize`], the negated errno
//!   reinterpreted as `usize`.
//!
//! Errors incurred by the caller never stop the kernel.
//!
//! [`Process::syscall`]: crate::Process::syscall
//! [`KernelError::into_usize`]: kcore::KernelError::into_usize

use crate::{FileStruct, file_table::FileDescriptor};
use kcore::KernelError;

/// A file system call with its arguments.
#[derive(Debug)]
pub enum Syscall<'a> {
    /// `open(path, flags, mode)`.
    Open {
        /// Path of the file.
        path: &'a str,
        /// Access mode and option bits.
        flags: u32,
        /// Permission of a created file.
        mode: u32,
    },
    /// `read(fd, buf)`.
    Read {
        /// Descriptor to read from.
        fd: FileDescriptor,
        /// Destination buffer.
        buf: &'a mut [u8],
    },
    /// `write(fd, buf)`.
    Write {
        /// Descriptor to write to.
        fd: FileDescriptor,
        /// Source buffer.
        buf: &'a [u8],
    },
    /// `lseek(fd, offset, whence)`.
    Seek {
        /// Descriptor whose cursor moves.
        fd: FileDescriptor,
        /// Signed distance from `whence`.
        offset: isize,
        /// `SEEK_SET`, `SEEK_CUR` or `SEEK_END`.
        whence: i32,
    },
    /// `tell(fd)`.
    Tell {
        /// Descriptor to query.
        fd: FileDescriptor,
    },
    /// `close(fd)`.
    Close {
        /// Descriptor to close.
        fd: FileDescriptor,
    },
    /// `dup(fd)`.
    Dup {
        /// Descriptor to duplicate.
        fd: FileDescriptor,
    },
    /// `dup2(old, new)`.
    Dup2 {
        /// Descriptor to duplicate.
        old: FileDescriptor,
        /// Slot that receives the duplicate.
        new: FileDescriptor,
    },
    /// `meld(a, b, out)`.
    Meld {
        /// First input.
        a: &'a str,
        /// Second input.
        b: &'a str,
        /// Output, which must not exist.
        out: &'a str,
    },
}

impl Syscall<'_> {
    /// Name of the call, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Syscall::Open { .. } => "open",
            Syscall::Read { .. } => "read",
            Syscall::Write { .. } => "write",
            Syscall::Seek { .. } => "seek",
            Syscall::Tell { .. } => "tell",
            Syscall::Close { .. } => "close",
            Syscall::Dup { .. } => "dup",
            Syscall::Dup2 { .. } => "dup2",
            Syscall::Meld { .. } => "meld",
        }
    }

    pub(crate) fn dispatch(self, files: &FileStruct) -> Result<usize, KernelError> {
        match self {
            Syscall::Open { path, flags, mode } => {
                files.open(path, flags, mode).map(FileDescriptor::into_usize)
            }
            Syscall::Read { fd, buf } => files.read(fd, buf),
            Syscall::Write { fd, buf } => files.write(fd, buf),
            Syscall::Seek { fd, offset, whence } => files.seek(fd, offset, whence),
            Syscall::Tell { fd } => files.tell(fd),
            Syscall::Close { fd } => files.close(fd).map(|()| 0),
            Syscall::Dup { fd } => files.dup(fd).map(FileDescriptor::into_usize),
            Syscall::Dup2 { old, new } => files.dup2(old, new).map(FileDescriptor::into_usize),
            Syscall::Meld { a, b, out } => files.meld(a, b, out),
        }
    }
}

/// Folds the result of a system call into its return word.
pub fn encode(result: Result<usize, KernelError>) -> usize {
    match result {
        Ok(value) => value,
        Err(e) => e.into_usize(),
    }
}
