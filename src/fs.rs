//! Filesystem collaborator
//!
//! The FAT driver, its VFS registration and its drive registry live outside of this crate.
//! Implement [Filesystem] on top of them to let a [Storage] session hand the medium over.
//!
//! [Storage]: crate::storage::Storage

use crate::error::{Error, FsError};
use num_enum::IntoPrimitive;

/// FatFs `FM_SFD` flag: format without a partition table
pub const FORMAT_SINGLE_PARTITION: u8 = 0x08;

/// Largest allocation unit, in sectors, used when formatting
const MAX_SECTORS_PER_CLUSTER: u32 = 128;

/// Index of a slot in the drive registry
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Drive(pub u8);

impl Drive {
    /// FatFs logical drive name, e.g. `0:`
    pub fn name(&self) -> [u8; 2] {
        [b'0'.wrapping_add(self.0), b':']
    }
}

/// A medium bound to a drive slot
///
/// Carries the driver-level handle the filesystem needs to reach the medium.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Disk {
    /// Wear-leveled flash partition
    Flash(u32),
    /// SD/MMC card
    Card(u32),
}

/// How a FAT volume is mounted
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MountMode {
    /// Probe the volume right away, reporting a missing filesystem
    Immediate,
    /// Bind the volume and defer probing to the first access
    Deferred,
}

/// FAT variant produced when a blank medium gets formatted
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatType {
    /// Let the driver choose the best fitting variant
    Any = 0x07,
    Fat = 0x01,
    Fat32 = 0x02,
    ExFat = 0x04,
}

impl Default for FormatType {
    fn default() -> Self {
        FormatType::Any
    }
}

/// Parameters of a format request, mirrors FatFs `MKFS_PARM`
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FormatParams {
    pub flags: u8,
    pub n_fat: u8,
    pub align: u32,
    pub n_root: u32,
    pub au_size: u32,
}

impl FormatParams {
    pub fn new(format: FormatType, single_partition: bool, au_size: u32) -> Self {
        let mut flags: u8 = format.into();
        if single_partition {
            flags |= FORMAT_SINGLE_PARTITION;
        }
        Self {
            flags,
            n_fat: 0,
            align: 0,
            n_root: 0,
            au_size,
        }
    }
}

/// Allocation unit size for a format of a medium with `sector_size` sectors
///
/// The `requested` size is clamped to one sector at least and
/// to 128 sectors at most.
pub fn allocation_unit_size(sector_size: u32, requested: u32) -> u32 {
    let max = sector_size.saturating_mul(MAX_SECTORS_PER_CLUSTER);
    requested.max(sector_size).min(max)
}

/// FAT driver, VFS and drive registry
pub trait Filesystem {
    /// Finds a free drive slot
    ///
    /// # Errors
    /// [Error::ResourceExhausted] if all slots are taken
    fn alloc_drive(&mut self) -> Result<Drive, Error>;

    /// Binds `disk` to `drive` in the drive registry
    fn attach(&mut self, drive: Drive, disk: Disk) -> Result<(), Error>;

    /// Releases `drive`
    fn detach(&mut self, drive: Drive);

    /// Looks up the drive `disk` is bound to
    fn drive_of(&self, disk: Disk) -> Option<Drive>;

    /// Enables or disables media presence polling for `drive`
    fn set_status_check(&mut self, _drive: Drive, _enabled: bool) {}

    /// Registers `drive` with the VFS at `base_path`
    fn register(&mut self, base_path: &str, drive: Drive, max_files: usize)
        -> Result<(), FsError>;

    /// Removes the VFS registration at `base_path`
    fn unregister(&mut self, base_path: &str) -> Result<(), FsError>;

    /// Mounts the FAT volume on `drive`
    fn mount(&mut self, drive: Drive, mode: MountMode) -> Result<(), FsError>;

    /// Unmounts the FAT volume on `drive`
    fn unmount(&mut self, drive: Drive);

    /// Creates a FAT volume on `drive` using `work` as scratch memory
    fn format(
        &mut self,
        drive: Drive,
        params: &FormatParams,
        work: &mut [u8],
    ) -> Result<(), FsError>;
}
