//! System call vocabulary shared between the kernel and its callers.

/// Flags for system calls.
pub mod flags {
    use crate::KernelError;
    use num_enum::TryFromPrimitive;

    /// The [`FileMode`] enum represents the access modes available when opening
    /// a file.
    ///
    /// This enum is used by user program to specify how a file is opened,
    /// determining which operations can be performed on the file. It
    /// defines three basic modes:
    /// - [`FileMode::Read`]: The file is opened for reading only.
    /// - [`FileMode::Write`]: The file is opened for writing only.
    /// - [`FileMode::ReadWrite`]: The file is opened for both reading and
    ///   writing.
    ///
    /// The discriminants are the values of the access-mode field of the open
    /// flags (`O_RDONLY`, `O_WRONLY`, `O_RDWR`).
    #[derive(Debug, PartialEq, PartialOrd, Ord, Eq, Clone, Copy, TryFromPrimitive)]
    #[repr(u32)]
    pub enum FileMode {
        /// Read-only access to the file.
        Read = 0,
        /// Write-only access to the file.
        Write = 1,
        /// Both Read and Write access to the file.
        ReadWrite = 2,
    }

    impl FileMode {
        /// Returns true if a file opened in this mode can be read.
        pub fn readable(self) -> bool {
            matches!(self, FileMode::Read | FileMode::ReadWrite)
        }

        /// Returns true if a file opened in this mode can be written.
        pub fn writable(self) -> bool {
            matches!(self, FileMode::Write | FileMode::ReadWrite)
        }
    }

    /// Mask of the access-mode field of the open flags.
    pub const O_ACCMODE: u32 = 0b11;

    bitflags::bitflags! {
        /// Option bits of `open`, everything outside [`O_ACCMODE`].
        pub struct OpenFlags: u32 {
            /// Create the file if it does not exist.
            const CREAT = 0o4;
            /// With [`OpenFlags::CREAT`], fail if the file exists.
            const EXCL = 0o10;
            /// Truncate the file to length zero when opened for writing.
            const TRUNC = 0o20;
            /// Every write goes to the end of the file.
            const APPEND = 0o40;
            /// Do not become the controlling terminal.
            const NOCTTY = 0o100;
        }
    }

    impl OpenFlags {
        /// Splits the raw flag word of `open` into its access mode and its
        /// option bits.
        ///
        /// The access-mode field must hold exactly one of `O_RDONLY`,
        /// `O_WRONLY` or `O_RDWR`; the remaining bits may be any subset of
        /// the known options.
        ///
        /// # Errors
        /// - [`KernelError::InvalidArgument`] if the access mode is `3`
        ///   (write-only and read-write at once) or an unknown option bit is
        ///   set.
        ///
        /// # Examples
        /// ```
        /// use kcore::syscall::flags::{FileMode, OpenFlags};
        ///
        /// let (mode, options) = OpenFlags::decompose(0o1 | 0o4 | 0o20).unwrap();
        /// assert_eq!(mode, FileMode::Write);
        /// assert_eq!(options, OpenFlags::CREAT | OpenFlags::TRUNC);
        /// ```
        pub fn decompose(raw: u32) -> Result<(FileMode, OpenFlags), KernelError> {
            let mode = FileMode::try_from(raw & O_ACCMODE)
                .map_err(|_| KernelError::InvalidArgument)?;
            let options = OpenFlags::from_bits(raw & !O_ACCMODE).ok_or(KernelError::InvalidArgument)?;
            Ok((mode, options))
        }
    }

    /// Reference point of a seek.
    #[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive)]
    #[repr(i32)]
    pub enum Whence {
        /// Offset is absolute.
        Set = 0,
        /// Offset is relative to the current cursor.
        Cur = 1,
        /// Offset is relative to the end of the file.
        End = 2,
    }

}
