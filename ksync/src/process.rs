//! # Processes.
//!
//! A [`Process`] owns the file state its threads share. Sibling threads call
//! into the same process through an `Arc<Process>`; the [`FileStruct`] and
//! its table take care of their own synchronization.

use crate::{FileStruct, syscall::Syscall};
use kcore::{SystemConfiguration, fs::Directory};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

/// A process.
pub struct Process {
    pid: u64,
    file_struct: FileStruct,
}

impl Process {
    /// Creates a process with no open file.
    pub fn new(root: Directory, config: SystemConfiguration) -> Self {
        let this = Self {
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            file_struct: FileStruct::new(root, config),
        };
        info!(
            "Process {} created (open_max {}).",
            this.pid, config.open_max
        );
        this
    }

    /// The process id.
    pub fn pid(&self) -> u64 {
        self.pid
    }

    /// The file state of this process.
    pub fn file_struct(&self) -> &FileStruct {
        &self.file_struct
    }

    /// Creates a child process sharing every open file of this one.
    pub fn fork(&self) -> Process {
        let child = Process {
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            file_struct: self.file_struct.fork(),
        };
        info!("Process {} forked into {}.", self.pid, child.pid);
        child
    }

    /// Terminates the process, closing every descriptor it holds.
    ///
    /// Returns `code`.
    pub fn exit(self, code: i32) -> i32 {
        let closed = self.file_struct.close_all();
        info!(
            "Process {} exited with {code} ({closed} descriptors closed).",
            self.pid
        );
        code
    }

    /// Handles a system call request of one of this process's threads.
    ///
    /// Returns the result encoded as a return word; see
    /// [`crate::syscall`].
    pub fn syscall(&self, call: Syscall<'_>) -> usize {
        let name = call.name();
        let result = call.dispatch(&self.file_struct);
        if let Err(e) = result {
            debug!("Process {}: {name} failed with {e}.", self.pid);
        }
        crate::syscall::encode(result)
    }
}
