//! Wear-leveled flash backend

use crate::backend::{release_drive, sector_address, Backend};
use crate::error::Error;
use crate::fmt::{error, warn};
use crate::fs::{Disk, Drive, Filesystem};

/// Wear-leveling layer on top of a flash partition
///
/// Addresses are byte offsets from the beginning of the partition.
/// Flash cannot be overwritten in place: a range must be erased before it's written.
pub trait WearLevelling {
    /// Driver handle identifying the partition in the drive registry
    fn handle(&self) -> u32;

    /// Sector size reported by the wear-leveling layer
    fn sector_size(&self) -> usize;

    /// Usable size of the partition in bytes
    fn size(&self) -> usize;

    fn read(&mut self, addr: usize, dest: &mut [u8]) -> Result<(), Error>;

    fn erase_range(&mut self, addr: usize, len: usize) -> Result<(), Error>;

    fn write(&mut self, addr: usize, src: &[u8]) -> Result<(), Error>;
}

/// [Backend] over a [WearLevelling] partition
pub struct FlashBackend<W: WearLevelling> {
    wl: W,
    sector_count: u32,
    sector_size: u32,
}

impl<W: WearLevelling> FlashBackend<W> {
    /// Creates a flash backend, caching the partition geometry
    ///
    /// A partition reporting a zero sector size yields zero sectors.
    pub fn new(wl: W) -> Self {
        let sector_size = wl.sector_size();
        let sector_count = if sector_size == 0 {
            warn!("msc: flash: WL sector size is zero");
            0
        } else {
            (wl.size() / sector_size) as u32
        };

        Self {
            wl,
            sector_count,
            sector_size: sector_size as u32,
        }
    }

    pub fn inner(&self) -> &W {
        &self.wl
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.wl
    }

    pub fn into_inner(self) -> W {
        self.wl
    }

    #[inline]
    fn disk(&self) -> Disk {
        Disk::Flash(self.wl.handle())
    }
}

impl<W: WearLevelling> Backend for FlashBackend<W> {
    fn mount<F: Filesystem>(&mut self, fs: &mut F, drive: Drive) -> Result<(), Error> {
        fs.attach(drive, self.disk())
    }

    fn unmount<F: Filesystem>(&mut self, fs: &mut F) -> Result<(), Error> {
        release_drive(fs, self.disk())
    }

    fn read(
        &mut self,
        sector_size: u32,
        lba: u32,
        offset: u32,
        dest: &mut [u8],
    ) -> Result<(), Error> {
        let addr = sector_address(sector_size, lba, offset)?;
        self.wl.read(addr as usize, dest)
    }

    fn write(&mut self, sector_size: u32, lba: u32, offset: u32, src: &[u8]) -> Result<(), Error> {
        let addr = sector_address(sector_size, lba, offset)? as usize;
        self.wl.erase_range(addr, src.len()).map_err(|err| {
            error!("msc: flash: Failed to erase {} bytes at {}", src.len(), addr);
            err
        })?;
        self.wl.write(addr, src)
    }

    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }
}
