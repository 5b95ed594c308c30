//! Per-process descriptor table.
//!
//! The table maps small non-negative integers to [`FileRef`]s. Each occupied
//! slot owns exactly one counted reference. All slot updates happen under
//! the table's [`ExclusiveLock`], so placing, looking up and closing are
//! atomic with respect to sibling threads of the same process.

use crate::{file::FileRef, sync::ExclusiveLock};
use kcore::{KernelError, config::MAX_DESCRIPTORS};

/// The type that represent a file descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileDescriptor(pub i32);

impl FileDescriptor {
    /// Converts the descriptor to a system call return word.
    pub fn into_usize(self) -> usize {
        self.0 as usize
    }
}

/// Mapping from descriptors to open files.
pub struct DescriptorTable {
    slots: ExclusiveLock<Vec<Option<FileRef>>>,
    capacity: usize,
}

impl DescriptorTable {
    /// Creates an empty table with `capacity` slots.
    ///
    /// The capacity is capped at [`MAX_DESCRIPTORS`].
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_DESCRIPTORS);
        Self {
            slots: ExclusiveLock::named("descriptor table", vec![None; capacity]),
            capacity,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        let len = slots.iter().filter(|s| s.is_some()).count();
        slots.unlock();
        len
    }

    /// Returns true if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self, fd: FileDescriptor) -> Result<usize, KernelError> {
        usize::try_from(fd.0)
            .ok()
            .filter(|&idx| idx < self.capacity)
            .ok_or(KernelError::BadFileDescriptor)
    }

    /// Stores a new reference to `file` in the lowest free slot.
    ///
    /// # Errors
    /// - [`KernelError::TooManyOpenFile`] if every slot is occupied. The
    ///   table and the reference count of `file` are unchanged.
    pub fn place(&self, file: &FileRef) -> Result<FileDescriptor, KernelError> {
        let mut slots = self.slots.lock();
        let Some(idx) = slots.iter().position(Option::is_none) else {
            slots.unlock();
            warning!("Descriptor table is full ({} slots).", self.capacity);
            return Err(KernelError::TooManyOpenFile);
        };
        slots[idx] = Some(file.clone());
        slots.unlock();
        Ok(FileDescriptor(idx as i32))
    }

    /// Stores a new reference to `file` at `fd` and returns the previous
    /// occupant, if any.
    ///
    /// The caller drops the returned reference after the table lock is
    /// gone.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is out of range.
    pub fn place_at(
        &self,
        fd: FileDescriptor,
        file: &FileRef,
    ) -> Result<Option<FileRef>, KernelError> {
        let idx = self.index(fd)?;
        let mut slots = self.slots.lock();
        let prev = slots[idx].replace(file.clone());
        slots.unlock();
        Ok(prev)
    }

    /// Looks up `fd` and returns a reference to its file for the duration
    /// of one operation.
    ///
    /// The reference keeps the file open even if `fd` is closed meanwhile.
    /// Give it back with [`DescriptorTable::put`].
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is out of range or empty.
    pub fn get(&self, fd: FileDescriptor) -> Result<FileRef, KernelError> {
        let idx = self.index(fd)?;
        let slots = self.slots.lock();
        let file = slots[idx].clone();
        slots.unlock();
        file.ok_or(KernelError::BadFileDescriptor)
    }

    /// Gives back a reference obtained from [`DescriptorTable::get`].
    pub fn put(&self, fd: FileDescriptor, file: FileRef) {
        if file.decref() {
            debug!("{fd:?} was closed during an operation on it.");
        }
    }

    /// Empties slot `fd` and returns its occupant.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is out of range or empty.
    pub fn take(&self, fd: FileDescriptor) -> Result<FileRef, KernelError> {
        let idx = self.index(fd)?;
        let mut slots = self.slots.lock();
        let file = slots[idx].take();
        slots.unlock();
        file.ok_or(KernelError::BadFileDescriptor)
    }

    /// Empties slot `fd` and drops the reference it held.
    ///
    /// Returns true if that was the last reference, in which case the
    /// storage object was released. If an operation still holds a reference
    /// from [`DescriptorTable::get`], this returns false and the release
    /// happens in the matching [`DescriptorTable::put`].
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is out of range or
    ///   already empty. No other slot is affected.
    pub fn close(&self, fd: FileDescriptor) -> Result<bool, KernelError> {
        self.take(fd).map(FileRef::decref)
    }

    /// Creates a copy of the table for a child process.
    ///
    /// Every occupied slot of the copy holds a new reference to the same
    /// file, so parent and child share cursors.
    pub fn fork(&self) -> DescriptorTable {
        let slots = self.slots.lock();
        let copy = (*slots).clone();
        slots.unlock();
        DescriptorTable {
            slots: ExclusiveLock::named("descriptor table", copy),
            capacity: self.capacity,
        }
    }

    /// Empties every slot and returns how many were occupied.
    pub fn close_all(&self) -> usize {
        let mut slots = self.slots.lock();
        let files = slots.iter_mut().filter_map(Option::take).collect::<Vec<_>>();
        slots.unlock();
        let n = files.len();
        drop(files);
        n
    }
}
