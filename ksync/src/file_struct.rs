//! # File state of a process.
//!
//! A process reaches files through **file descriptors**: small integers that
//! index its [`DescriptorTable`]. Each occupied slot holds a counted
//! reference to an open [`FileHandle`]. The handle, not the slot, owns the
//! cursor and the access mode, so descriptors created with
//! [`FileStruct::dup`] or inherited through [`FileStruct::fork`] move one
//! shared cursor.
//!
//! [`FileStruct`] implements the file system calls on top of the table:
//!
//! | Call        | Effect                                               |
//! |-------------|------------------------------------------------------|
//! | `open`      | Resolve a path, create a handle, place it            |
//! | `read`      | Transfer from the file at the shared cursor          |
//! | `write`     | Transfer to the file at the shared cursor            |
//! | `seek`      | Move the shared cursor                               |
//! | `tell`      | Report the shared cursor                             |
//! | `fstat`     | Metadata of the storage object                       |
//! | `close`     | Empty the slot and drop its reference                |
//! | `dup`       | Share a handle through the lowest free slot          |
//! | `dup2`      | Share a handle through a chosen slot                 |
//! | `meld`      | Interleave two files into a new one                  |
//!
//! Errors never stop the kernel. Every failure is reported as a
//! [`KernelError`] to the caller, and a failed call has no side effect on
//! the table.
//!
//! [`FileHandle`]: crate::file::FileHandle

use crate::{
    file::{FileHandle, FileRef},
    file_table::{DescriptorTable, FileDescriptor},
};
use kcore::{
    KernelError, SystemConfiguration,
    fs::{Directory, Stat},
    syscall::flags::{FileMode, OpenFlags, Whence},
};

/// Size of the words [`FileStruct::meld`] interleaves.
pub const MELD_WORD: usize = 4;

/// Permission of the file [`FileStruct::meld`] creates.
const MELD_PERMISSION: u32 = 0o664;

/// The [`FileStruct`] represents the filesystem state for a specific
/// process, which corresponding to the Linux kernel's `struct files_struct`.
///
/// Sibling threads of a process call into the same [`FileStruct`]
/// concurrently; every method takes `&self`.
pub struct FileStruct {
    root: Directory,
    config: SystemConfiguration,
    table: DescriptorTable,
}

impl FileStruct {
    /// Creates a file state with an empty table of
    /// [`SystemConfiguration::open_max`] slots.
    pub fn new(root: Directory, config: SystemConfiguration) -> Self {
        Self {
            root,
            config,
            table: DescriptorTable::new(config.open_max),
        }
    }

    /// The descriptor table.
    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    /// The directory paths are resolved against.
    pub fn root(&self) -> &Directory {
        &self.root
    }

    /// Opens a file.
    ///
    /// # Syscall API
    /// ```c
    /// int open(const char *pathname, int flags, mode_t mode);
    /// ```
    /// - `flags`: exactly one access mode (`O_RDONLY`, `O_WRONLY`, `O_RDWR`)
    ///   combined with any subset of [`OpenFlags`].
    /// - `mode`: permission of the file if it is created.
    ///
    /// Returns the lowest free descriptor, which now refers to a new handle
    /// with cursor 0.
    ///
    /// # Errors
    /// - [`KernelError::InvalidArgument`] if `flags` is malformed or `path`
    ///   is empty. Nothing was opened.
    /// - [`KernelError::NameTooLong`] if `path` exceeds
    ///   [`SystemConfiguration::path_max`].
    /// - [`KernelError::NoSuchEntry`] if the file does not exist and
    ///   [`OpenFlags::CREAT`] is not given.
    /// - [`KernelError::FileExist`] if the file exists and both
    ///   [`OpenFlags::CREAT`] and [`OpenFlags::EXCL`] are given.
    /// - [`KernelError::TooManyOpenFile`] if the table is full. The new
    ///   handle is released and the table is unchanged.
    pub fn open(
        &self,
        path: &str,
        flags: u32,
        permission: u32,
    ) -> Result<FileDescriptor, KernelError> {
        let (mode, options) = OpenFlags::decompose(flags)?;
        if path.is_empty() {
            return Err(KernelError::InvalidArgument);
        }
        if path.len() > self.config.path_max {
            return Err(KernelError::NameTooLong);
        }

        let file = if options.contains(OpenFlags::CREAT) {
            match self.root.create(path, permission) {
                Ok(file) => file,
                Err(KernelError::FileExist) if !options.contains(OpenFlags::EXCL) => {
                    self.root.open(path)?
                }
                Err(e) => return Err(e),
            }
        } else {
            self.root.open(path)?
        };
        if options.contains(OpenFlags::TRUNC) && mode.writable() {
            file.truncate(0)?;
        }

        let ino = file.ino().into_u32();
        let handle = FileRef::new(FileHandle::new(file, mode, options));
        let fd = self.table.place(&handle)?;
        debug!("open({path:?}, {mode:?}, {options:?}) = {fd:?} (ino {ino}).");
        Ok(fd)
    }

    /// Reads up to `buf.len()` bytes from `fd` at its cursor.
    ///
    /// Returns the number of bytes read; 0 at the end of the file.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is not open.
    /// - [`KernelError::InvalidAccess`] if `fd` was opened write-only.
    /// - Errors of the storage object, unchanged.
    pub fn read(&self, fd: FileDescriptor, buf: &mut [u8]) -> Result<usize, KernelError> {
        let file = self.table.get(fd)?;
        let result = file.read(buf);
        self.table.put(fd, file);
        result
    }

    /// Writes `buf` to `fd` at its cursor.
    ///
    /// Returns the number of bytes written, which may be less than
    /// `buf.len()`.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is not open.
    /// - [`KernelError::InvalidAccess`] if `fd` was opened read-only.
    /// - Errors of the storage object, unchanged.
    pub fn write(&self, fd: FileDescriptor, buf: &[u8]) -> Result<usize, KernelError> {
        let file = self.table.get(fd)?;
        let result = file.write(buf);
        self.table.put(fd, file);
        result
    }

    /// Moves the cursor of `fd`.
    ///
    /// `whence` is `SEEK_SET` (0), `SEEK_CUR` (1) or `SEEK_END` (2). Returns
    /// the new cursor.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is not open.
    /// - [`KernelError::InvalidArgument`] if `whence` is unknown or the new
    ///   cursor would be negative.
    pub fn seek(
        &self,
        fd: FileDescriptor,
        offset: isize,
        whence: i32,
    ) -> Result<usize, KernelError> {
        let whence = Whence::try_from(whence).map_err(|_| KernelError::InvalidArgument)?;
        let file = self.table.get(fd)?;
        let result = file.seek(offset, whence);
        self.table.put(fd, file);
        result
    }

    /// Returns the cursor of `fd`.
    pub fn tell(&self, fd: FileDescriptor) -> Result<usize, KernelError> {
        let file = self.table.get(fd)?;
        let position = file.tell();
        self.table.put(fd, file);
        Ok(position)
    }

    /// Returns the metadata of the file `fd` refers to.
    pub fn fstat(&self, fd: FileDescriptor) -> Result<Stat, KernelError> {
        let file = self.table.get(fd)?;
        let stat = file.stat();
        self.table.put(fd, file);
        Ok(stat)
    }

    /// Closes `fd`.
    ///
    /// The handle is released when this was its last reference.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is not open. No other
    ///   descriptor is affected.
    pub fn close(&self, fd: FileDescriptor) -> Result<(), KernelError> {
        self.table.close(fd).map(|_| ())
    }

    /// Makes the lowest free descriptor refer to the handle of `fd`.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `fd` is not open.
    /// - [`KernelError::TooManyOpenFile`] if the table is full.
    pub fn dup(&self, fd: FileDescriptor) -> Result<FileDescriptor, KernelError> {
        let file = self.table.get(fd)?;
        let result = self.table.place(&file);
        self.table.put(fd, file);
        result
    }

    /// Makes `new` refer to the handle of `old`, closing what `new` referred
    /// to before.
    ///
    /// If `old == new` and `old` is open, nothing changes.
    ///
    /// # Errors
    /// - [`KernelError::BadFileDescriptor`] if `old` is not open or `new` is
    ///   out of range.
    pub fn dup2(
        &self,
        old: FileDescriptor,
        new: FileDescriptor,
    ) -> Result<FileDescriptor, KernelError> {
        let file = self.table.get(old)?;
        let result = if old == new {
            Ok(None)
        } else {
            self.table.place_at(new, &file)
        };
        self.table.put(old, file);
        // The previous occupant is released outside the table lock.
        result.map(|prev| {
            if let Some(prev) = prev {
                prev.decref();
            }
            new
        })
    }

    /// Writes the contents of `a` and `b` to a new file `out`, alternating
    /// [`MELD_WORD`]-byte words from each.
    ///
    /// Once one input is exhausted the rest of the other is copied as is.
    /// The three files go through this process's table like any other open
    /// file and are closed before returning. Returns the number of bytes
    /// written.
    ///
    /// # Errors
    /// - [`KernelError::NoSuchEntry`] if `a` or `b` does not exist.
    /// - [`KernelError::FileExist`] if `out` exists.
    /// - [`KernelError::TooManyOpenFile`] if the table cannot hold the three
    ///   files.
    /// - Errors of the transfers, unchanged.
    pub fn meld(&self, a: &str, b: &str, out: &str) -> Result<usize, KernelError> {
        let rdonly = FileMode::Read as u32;
        let wronly_excl =
            FileMode::Write as u32 | (OpenFlags::CREAT | OpenFlags::EXCL).bits();

        let mut opened = Vec::with_capacity(3);
        let mut result = Ok(0);
        for (path, flags) in [(a, rdonly), (b, rdonly), (out, wronly_excl)] {
            match self.open(path, flags, MELD_PERMISSION) {
                Ok(fd) => opened.push(fd),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if let [a, b, out] = opened[..] {
            result = self.interleave(a, b, out);
        }

        for fd in opened {
            if self.close(fd).is_err() {
                warning!("meld: {fd:?} was closed by another thread.");
            }
        }
        result
    }

    fn interleave(
        &self,
        a: FileDescriptor,
        b: FileDescriptor,
        out: FileDescriptor,
    ) -> Result<usize, KernelError> {
        let mut word = [0u8; MELD_WORD];
        let mut inputs = [(a, false), (b, false)];
        let mut written = 0;
        while inputs.iter().any(|(_, done)| !done) {
            for (fd, done) in inputs.iter_mut().filter(|(_, done)| !*done) {
                let n = self.read(*fd, &mut word)?;
                if n == 0 {
                    *done = true;
                } else {
                    written += self.write_all(out, &word[..n])?;
                }
            }
        }
        Ok(written)
    }

    fn write_all(&self, fd: FileDescriptor, mut buf: &[u8]) -> Result<usize, KernelError> {
        let len = buf.len();
        while !buf.is_empty() {
            match self.write(fd, buf)? {
                0 => return Err(KernelError::IOError),
                n => buf = &buf[n..],
            }
        }
        Ok(len)
    }

    /// Creates the file state of a child process.
    ///
    /// The child's table holds a new reference to every handle of this
    /// table, in the same slots.
    pub fn fork(&self) -> FileStruct {
        FileStruct {
            root: self.root.clone(),
            config: self.config,
            table: self.table.fork(),
        }
    }

    /// Closes every descriptor. Returns how many were open.
    pub fn close_all(&self) -> usize {
        self.table.close_all()
    }
}
