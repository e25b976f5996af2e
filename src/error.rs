//! Error kinds shared by the storage session, the backends and the bridge

/// Storage error
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Operation attempted in the wrong mount state, or no session present
    InvalidState,
    /// Malformed size or argument
    InvalidArg,
    /// Address arithmetic overflow
    InvalidSize,
    /// Allocation failure
    NoMemory,
    /// No free drive slot
    ResourceExhausted,
    /// Configuration not supported by the medium
    NotSupported,
    /// Generic or backend-reported fault
    Failure,
}

/// Outcome reported by the [Filesystem] collaborator
///
/// [Filesystem]: crate::fs::Filesystem
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsError {
    /// The volume carries no recognizable filesystem
    NoFilesystem,
    /// The filesystem driver hit an internal error, usually a corrupted volume
    Internal,
    /// The path is already registered with the VFS
    AlreadyRegistered,
    /// The filesystem driver ran out of memory
    NoMemory,
    /// Any other failure
    Failure,
}

impl From<FsError> for Error {
    fn from(value: FsError) -> Self {
        match value {
            FsError::AlreadyRegistered => Error::InvalidState,
            FsError::NoMemory => Error::NoMemory,
            FsError::NoFilesystem | FsError::Internal | FsError::Failure => Error::Failure,
        }
    }
}
