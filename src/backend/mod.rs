//! Storage backends
//!
//! A [Backend] presents a medium as an array of equally sized sectors. Two backends are provided:
//! * [FlashBackend] - wear-leveled flash partition, requires erase before write
//! * [CardBackend] - SD/MMC card, addressed in whole sectors
//!
//! Implement [Backend] for any other medium.
//!
//! [FlashBackend]: crate::backend::flash::FlashBackend
//! [CardBackend]: crate::backend::card::CardBackend

use crate::error::Error;
use crate::fmt::error;
use crate::fs::{Disk, Drive, Filesystem};

pub mod card;
pub mod flash;

/// Uniform sector interface over a storage medium
///
/// `sector_count` and `sector_size` are computed once when the backend is created
/// and never change afterwards.
pub trait Backend {
    /// Attaches the medium to `drive` in the filesystem's drive registry
    fn mount<F: Filesystem>(&mut self, fs: &mut F, drive: Drive) -> Result<(), Error>;

    /// Unmounts the volume and releases the drive the medium is bound to
    ///
    /// # Errors
    /// [Error::InvalidState] if the medium is not bound to any drive
    fn unmount<F: Filesystem>(&mut self, fs: &mut F) -> Result<(), Error>;

    /// Reads `dest.len()` bytes starting at `lba * sector_size + offset`
    ///
    /// # Errors
    /// [Error::InvalidSize] if the address overflows
    fn read(&mut self, sector_size: u32, lba: u32, offset: u32, dest: &mut [u8])
        -> Result<(), Error>;

    /// Writes `src` starting at `lba * sector_size + offset`
    ///
    /// # Errors
    /// [Error::InvalidSize] if the address overflows
    fn write(&mut self, sector_size: u32, lba: u32, offset: u32, src: &[u8]) -> Result<(), Error>;

    /// Total number of sectors
    fn sector_count(&self) -> u32;

    /// Size of a single sector in bytes
    fn sector_size(&self) -> u32;
}

/// Byte address of `offset` within `lba`
///
/// LBA and offset come straight from the USB host, so both the multiplication
/// and the addition are checked.
pub fn sector_address(sector_size: u32, lba: u32, offset: u32) -> Result<u32, Error> {
    let base = lba.checked_mul(sector_size).ok_or_else(|| {
        error!(
            "msc: backend: Overflow lba {} sector_size {}",
            lba, sector_size
        );
        Error::InvalidSize
    })?;
    base.checked_add(offset).ok_or_else(|| {
        error!("msc: backend: Overflow addr {} offset {}", base, offset);
        Error::InvalidSize
    })
}

/// Shared unmount sequence: resolve the drive, drop the volume, free the slot
fn release_drive<F: Filesystem>(fs: &mut F, disk: Disk) -> Result<(), Error> {
    let drive = fs.drive_of(disk).ok_or_else(|| {
        error!("msc: backend: No drive bound to {}", disk);
        Error::InvalidState
    })?;
    fs.unmount(drive);
    fs.detach(drive);
    Ok(())
}
