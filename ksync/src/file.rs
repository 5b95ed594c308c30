//! Open files shared between descriptors.
//!
//! A [`FileHandle`] is what `open` creates: a storage object together with
//! the access mode it was opened with and a byte cursor. Several descriptor
//! slots, possibly in different processes, may refer to the same handle and
//! therefore share its cursor. Sharing goes through [`FileRef`], a counted
//! reference; the handle and its storage object are released exactly when
//! the last reference goes away.
//!
//! Every transfer holds the handle's private [`ExclusiveLock`] from the
//! access check, through the storage call, to the cursor update. Two
//! transfers on the same handle never interleave, whichever descriptor they
//! come through.

use crate::sync::ExclusiveLock;
use kcore::{
    KernelError,
    fs::{RegularFile, Stat},
    syscall::flags::{FileMode, OpenFlags, Whence},
};
use std::{ops::Deref, sync::Arc};

/// State of a handle that only a transfer holding the handle lock may touch.
struct Cursor {
    mode: FileMode,
    position: usize,
}

/// An open file.
pub struct FileHandle {
    file: RegularFile,
    append: bool,
    cursor: ExclusiveLock<Cursor>,
}

impl FileHandle {
    /// Creates a handle over `file` with cursor 0.
    pub fn new(file: RegularFile, mode: FileMode, options: OpenFlags) -> Self {
        Self {
            file,
            append: options.contains(OpenFlags::APPEND),
            cursor: ExclusiveLock::named("file handle", Cursor { mode, position: 0 }),
        }
    }

    /// The access mode the file was opened with.
    pub fn mode(&self) -> FileMode {
        let cursor = self.cursor.lock();
        let mode = cursor.mode;
        cursor.unlock();
        mode
    }

    /// The storage object.
    pub fn file(&self) -> &RegularFile {
        &self.file
    }

    /// Reads from the cursor into `buf` and advances the cursor by the
    /// number of bytes read.
    ///
    /// # Errors
    /// - [`KernelError::InvalidAccess`] if the handle was opened write-only.
    /// - Any error of the storage object, in which case the cursor is left
    ///   unchanged.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        let mut cursor = self.cursor.lock();
        if !cursor.mode.readable() {
            cursor.unlock();
            return Err(KernelError::InvalidAccess);
        }
        let result = self.file.read(cursor.position, buf);
        if let Ok(read_bytes) = result {
            cursor.position += read_bytes;
        }
        cursor.unlock();
        result
    }

    /// Writes `buf` at the cursor and advances the cursor by the number of
    /// bytes written.
    ///
    /// A handle opened with [`OpenFlags::APPEND`] first moves the cursor to
    /// the end of the file.
    ///
    /// # Errors
    /// - [`KernelError::InvalidAccess`] if the handle was opened read-only.
    /// - Any error of the storage object, in which case the cursor is left
    ///   unchanged.
    pub fn write(&self, buf: &[u8]) -> Result<usize, KernelError> {
        let mut cursor = self.cursor.lock();
        if !cursor.mode.writable() {
            cursor.unlock();
            return Err(KernelError::InvalidAccess);
        }
        let position = if self.append {
            self.file.size()
        } else {
            cursor.position
        };
        let result = self.file.write(position, buf);
        if let Ok(written_bytes) = result {
            cursor.position = position + written_bytes;
        }
        cursor.unlock();
        result
    }

    /// Moves the cursor and returns its new position.
    ///
    /// # Errors
    /// - [`KernelError::InvalidArgument`] if the new position would be
    ///   negative or does not fit.
    pub fn seek(&self, offset: isize, whence: Whence) -> Result<usize, KernelError> {
        let mut cursor = self.cursor.lock();
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => cursor.position,
            Whence::End => self.file.size(),
        };
        match base.checked_add_signed(offset) {
            Some(position) if position <= isize::MAX as usize => {
                cursor.position = position;
                cursor.unlock();
                Ok(position)
            }
            _ => {
                cursor.unlock();
                Err(KernelError::InvalidArgument)
            }
        }
    }

    /// The current cursor.
    pub fn tell(&self) -> usize {
        let cursor = self.cursor.lock();
        let position = cursor.position;
        cursor.unlock();
        position
    }

    /// Metadata of the storage object.
    pub fn stat(&self) -> Stat {
        self.file.stat()
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        debug!("Releasing file (ino {}).", self.file.ino().into_u32());
        if let Err(e) = self.file.writeback() {
            warning!(
                "Writeback failed while releasing file (ino {}): {e}",
                self.file.ino().into_u32()
            );
        }
    }
}

/// A counted reference to a [`FileHandle`].
///
/// Cloning a `FileRef` takes a new reference; dropping one gives it back.
/// The decrement and the release of the handle on the last reference are a
/// single atomic step, so two holders closing concurrently never both (or
/// neither) release it.
#[derive(Clone)]
pub struct FileRef(Arc<FileHandle>);

impl FileRef {
    /// Wraps a new handle with a reference count of 1.
    pub fn new(handle: FileHandle) -> Self {
        Self(Arc::new(handle))
    }

    /// Number of live references to the handle.
    ///
    /// This counts descriptor slots plus the references lent out by
    /// [`DescriptorTable::get`] to operations still in progress.
    ///
    /// [`DescriptorTable::get`]: crate::DescriptorTable::get
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Returns true if both references point to the same handle.
    pub fn ptr_eq(&self, other: &FileRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Gives the reference back.
    ///
    /// Returns true if this was the last reference and the handle was
    /// released.
    pub fn decref(self) -> bool {
        // `into_inner` decides "last" and takes ownership atomically.
        Arc::into_inner(self.0).is_some()
    }
}

impl Deref for FileRef {
    type Target = FileHandle;

    fn deref(&self) -> &FileHandle {
        &self.0
    }
}

impl core::fmt::Debug for FileRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileRef")
            .field("ino", &self.0.file.ino())
            .field("refcount", &self.refcount())
            .finish()
    }
}
