//! # Blocking synchronization and shared open files.
//!
//! This crate builds the sleeping half of the kernel's concurrency layer on
//! top of the primitives of [`kcore`]:
//!
//! - [`sync`]: wait queues and the blocking primitives built on them
//!   ([`Semaphore`], [`ExclusiveLock`] and [`ConditionVariable`]).
//! - [`file`]: open files ([`FileHandle`]) with a shared cursor, reached
//!   through counted references ([`FileRef`]).
//! - [`file_table`]: the per-process [`DescriptorTable`].
//! - [`file_struct`]: the file system calls of a process, built from the
//!   three modules above.
//! - [`process`] and [`syscall`]: processes owning a [`FileStruct`] and the
//!   typed system call entry point.
//!
//! Nothing here reaches for an ambient "current process". Every file system
//! call is a method on the [`FileStruct`] (or [`Process`]) it acts on, and
//! the calling thread is identified by [`kcore::thread::Current`].
//!
//! [`Semaphore`]: sync::Semaphore
//! [`ExclusiveLock`]: sync::ExclusiveLock
//! [`ConditionVariable`]: sync::ConditionVariable

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

#[macro_use]
extern crate kcore;

pub mod file;
pub mod file_struct;
pub mod file_table;
pub mod process;
pub mod sync;
pub mod syscall;

pub use file::{FileHandle, FileRef};
pub use file_struct::FileStruct;
pub use file_table::{DescriptorTable, FileDescriptor};
pub use process::Process;
pub use syscall::Syscall;
