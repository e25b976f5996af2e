//! SD/MMC card backend

use crate::backend::{release_drive, Backend};
use crate::error::Error;
use crate::fmt::error;
use crate::fs::{Disk, Drive, Filesystem};

/// SD/MMC card driver
///
/// Transfers are expressed in whole sectors.
pub trait Card {
    /// Driver handle identifying the card in the drive registry
    fn handle(&self) -> u32;

    /// Capacity in sectors, as reported by the card's CSD
    fn capacity(&self) -> u32;

    /// Sector size in bytes, as reported by the card's CSD
    fn sector_size(&self) -> u32;

    fn read_sectors(&mut self, dest: &mut [u8], start: u32, count: u32) -> Result<(), Error>;

    fn write_sectors(&mut self, src: &[u8], start: u32, count: u32) -> Result<(), Error>;
}

/// [Backend] over an SD/MMC [Card]
pub struct CardBackend<C: Card> {
    card: C,
    sector_count: u32,
    sector_size: u32,
}

impl<C: Card> CardBackend<C> {
    /// Creates a card backend, caching the card geometry
    pub fn new(card: C) -> Self {
        Self {
            sector_count: card.capacity(),
            sector_size: card.sector_size(),
            card,
        }
    }

    pub fn inner(&self) -> &C {
        &self.card
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.card
    }

    pub fn into_inner(self) -> C {
        self.card
    }

    #[inline]
    fn disk(&self) -> Disk {
        Disk::Card(self.card.handle())
    }
}

/// Translates a byte span into `(start sector, sector count)`
///
/// Cards larger than 4 GiB don't fit a 32-bit byte address, so the span is kept in
/// sector units and only the sector index is overflow checked.
fn sector_span(sector_size: u32, lba: u32, offset: u32, len: usize) -> Result<(u32, u32), Error> {
    if sector_size == 0 || offset % sector_size != 0 || len % sector_size as usize != 0 {
        error!(
            "msc: card: Unaligned access lba {} offset {} size {} sector_size {}",
            lba, offset, len, sector_size
        );
        return Err(Error::InvalidArg);
    }
    let start = lba.checked_add(offset / sector_size).ok_or_else(|| {
        error!("msc: card: Overflow lba {} offset {}", lba, offset);
        Error::InvalidSize
    })?;
    let count = u32::try_from(len / sector_size as usize).map_err(|_| Error::InvalidSize)?;
    Ok((start, count))
}

impl<C: Card> Backend for CardBackend<C> {
    fn mount<F: Filesystem>(&mut self, fs: &mut F, drive: Drive) -> Result<(), Error> {
        fs.attach(drive, self.disk())?;
        // the card is owned for the whole session, no hot-plug polling
        fs.set_status_check(drive, false);
        Ok(())
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
        let (start, count) = sector_span(sector_size, lba, offset, dest.len())?;
        self.card.read_sectors(dest, start, count)
    }

    fn write(&mut self, sector_size: u32, lba: u32, offset: u32, src: &[u8]) -> Result<(), Error> {
        let (start, count) = sector_span(sector_size, lba, offset, src.len())?;
        self.card.write_sectors(src, start, count)
    }

    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }
}
