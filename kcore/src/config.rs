//! System-wide configuration.
//!
//! The configuration is fixed when a process's file state is created. It can
//! be assembled with [`SystemConfigurationBuilder`] or parsed from a kernel
//! command line such as `"open_max=16 path_max=256"`.

use crate::KernelError;

/// Default number of descriptors a process may hold open at once.
pub const OPEN_MAX: usize = 128;
/// Default maximum length of a path, in bytes.
pub const PATH_MAX: usize = 1024;
/// Largest accepted `open_max`. Descriptors are non-negative `i32`s.
pub const MAX_DESCRIPTORS: usize = i32::MAX as usize;

/// System configuration settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfiguration {
    /// Capacity of each process's descriptor table.
    pub open_max: usize,
    /// Maximum length of a path passed to `open`.
    pub path_max: usize,
}

impl Default for SystemConfiguration {
    fn default() -> Self {
        Self {
            open_max: OPEN_MAX,
            path_max: PATH_MAX,
        }
    }
}

impl SystemConfiguration {
    /// Start building a configuration from the defaults.
    pub fn builder() -> SystemConfigurationBuilder {
        SystemConfigurationBuilder {
            conf: Self::default(),
        }
    }

    /// Parse a kernel command line.
    ///
    /// The command line is a whitespace-separated list of `key=value`
    /// pairs. Keys not mentioned keep their default value.
    ///
    /// # Errors
    /// - [`KernelError::InvalidArgument`] on an unknown key, a malformed
    ///   pair, or a value that is not a positive integer.
    pub fn from_cmdline(cmdline: &str) -> Result<Self, KernelError> {
        let mut builder = Self::builder();
        for arg in cmdline.split_whitespace() {
            let (key, value) = arg.split_once('=').ok_or(KernelError::InvalidArgument)?;
            let value = value
                .parse::<usize>()
                .map_err(|_| KernelError::InvalidArgument)?;
            builder = match key {
                "open_max" => builder.open_max(value),
                "path_max" => builder.path_max(value),
                _ => return Err(KernelError::InvalidArgument),
            };
        }
        let conf = builder.build()?;
        info!("Configuration: {conf:?}");
        Ok(conf)
    }
}

/// A builder for system configuration settings.
///
/// # Examples
/// ```
/// use kcore::SystemConfiguration;
///
/// let conf = SystemConfiguration::builder().open_max(4).build().unwrap();
/// assert_eq!(conf.open_max, 4);
/// ```
pub struct SystemConfigurationBuilder {
    conf: SystemConfiguration,
}

impl SystemConfigurationBuilder {
    /// Sets the capacity of each descriptor table.
    pub fn open_max(mut self, open_max: usize) -> Self {
        self.conf.open_max = open_max;
        self
    }

    /// Sets the maximum path length.
    pub fn path_max(mut self, path_max: usize) -> Self {
        self.conf.path_max = path_max;
        self
    }

    /// Finish the configuration.
    ///
    /// # Errors
    /// - [`KernelError::InvalidArgument`] if a limit is zero, or if
    ///   `open_max` exceeds the number of representable descriptors.
    pub fn build(self) -> Result<SystemConfiguration, KernelError> {
        if self.conf.open_max == 0 || self.conf.path_max == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if self.conf.open_max > MAX_DESCRIPTORS {
            return Err(KernelError::InvalidArgument);
        }
        Ok(self.conf)
    }
}
