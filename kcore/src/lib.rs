//! # kcore: the kernel base layer.
//!
//! This crate provides the ground every higher-level kernel service stands
//! on: the error vocabulary shared by all kernel operations, the short
//! critical section ([`SpinLock`]) together with the preemption model it
//! relies on, the execution-context model ([`thread`]), the abstract storage
//! interface that open files are built over ([`fs`]), and the system-wide
//! configuration.
//!
//! The kernel runs *hosted*: every execution context is a host thread, and
//! "suspending" a context parks that host thread until another context
//! explicitly wakes it through a [`ParkHandle`]. Nothing in this crate
//! schedules; contexts run whenever the host runs them, which is exactly the
//! preemptible, multi-core environment the blocking primitives in the upper
//! layers must be correct under.
//!
//! ## Conventions
//!
//! - Recoverable failures are reported as [`KernelError`] and propagated
//!   with `?`. At the system-call boundary they are folded into a single
//!   return word with [`KernelError::into_usize`].
//! - Violations of a primitive's contract (holding a spinlock into a suspend
//!   point, forgetting to unlock a guard, blocking inside an interrupt
//!   handler) are programming errors and panic.
//! - Guards of the kernel locks do **not** unlock on drop. Every guard must
//!   be released with an explicit `unlock()`; dropping one panics and
//!   reports where the lock was taken.
//!
//! [`SpinLock`]: sync::SpinLock
//! [`ParkHandle`]: thread::ParkHandle

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

#[macro_use]
pub mod kprint;

pub mod config;
pub mod fs;
pub mod interrupt;
pub mod sync;
pub mod syscall;
pub mod thread;

pub use config::{SystemConfiguration, SystemConfigurationBuilder};

/// Enum representing errors that can occur during a kernel operation.
///
/// This enum is used to categorize errors encountered by the kernel operation.
/// Each variant corresponds to a specific type of error that might
/// occur during the handling of a kernel operation. These errors can be
/// returned to the user program to indicate the nature of the failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum KernelError {
    /// Operation is not permitted. (EPERM)
    OperationNotPermitted,
    /// No such file or directory. (ENOENT)
    NoSuchEntry,
    /// IO Error. (EIO)
    IOError,
    /// BAD file descriptor. (EBADF)
    BadFileDescriptor,
    /// Out of memory. (ENOMEM)
    NoMemory,
    /// Permission denied. (EACCES)
    InvalidAccess,
    /// Bad address. (EFAULT)
    BadAddress,
    /// File exists. (EEXIST)
    FileExist,
    /// Not a directory. (ENOTDIR)
    NotDirectory,
    /// Is a directory. (EISDIR)
    IsDirectory,
    /// Invalid arguement. (EINVAL)
    InvalidArgument,
    /// Too many open files. (EMFILE)
    TooManyOpenFile,
    /// File too large. (EFBIG)
    FileTooLarge,
    /// No space left on device. (ENOSPC)
    NoSpace,
    /// File name too long. (ENAMETOOLONG)
    NameTooLong,
    /// Invalid system call number. (ENOSYS)
    NoSuchSyscall,
    /// Operation is not supported. (ENOTSUPP)
    NotSupportedOperation,
}

impl KernelError {
    /// Converts the [`KernelError`] enum into a corresponding `usize` error
    /// code. The result is cast to `usize` for use as a return value in
    /// system calls.
    pub fn into_usize(self) -> usize {
        self.into_isize() as usize
    }

    fn into_isize(self) -> isize {
        match self {
            KernelError::OperationNotPermitted => -1,
            KernelError::NoSuchEntry => -2,
            KernelError::IOError => -5,
            KernelError::BadFileDescriptor => -9,
            KernelError::NoMemory => -12,
            KernelError::InvalidAccess => -13,
            KernelError::BadAddress => -14,
            KernelError::FileExist => -17,
            KernelError::NotDirectory => -20,
            KernelError::IsDirectory => -21,
            KernelError::InvalidArgument => -22,
            KernelError::TooManyOpenFile => -24,
            KernelError::FileTooLarge => -27,
            KernelError::NoSpace => -28,
            KernelError::NameTooLong => -36,
            KernelError::NoSuchSyscall => -38,
            KernelError::NotSupportedOperation => -524,
        }
    }
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} ({})", self, self.into_isize())
    }
}

/// The given `isize` does not indicate an [`KernelError`].
#[derive(Debug, Eq, PartialEq)]
pub struct TryFromError {
    e: isize,
}

impl TryFrom<isize> for KernelError {
    type Error = TryFromError;

    fn try_from(value: isize) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::OperationNotPermitted),
            -2 => Ok(Self::NoSuchEntry),
            -5 => Ok(Self::IOError),
            -9 => Ok(Self::BadFileDescriptor),
            -12 => Ok(Self::NoMemory),
            -13 => Ok(Self::InvalidAccess),
            -14 => Ok(Self::BadAddress),
            -17 => Ok(Self::FileExist),
            -20 => Ok(Self::NotDirectory),
            -21 => Ok(Self::IsDirectory),
            -22 => Ok(Self::InvalidArgument),
            -24 => Ok(Self::TooManyOpenFile),
            -27 => Ok(Self::FileTooLarge),
            -28 => Ok(Self::NoSpace),
            -36 => Ok(Self::NameTooLong),
            -38 => Ok(Self::NoSuchSyscall),
            -524 => Ok(Self::NotSupportedOperation),
            e => Err(TryFromError { e }),
        }
    }
}
