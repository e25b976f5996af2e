//! [usbd-storage] Bulk Only Transport adapter
//!
//! [BulkOnlyHandler] serves the commands decoded by a
//! [Scsi]`<`[BulkOnly]`>` class through an [Msc] bridge.
//! Call [BulkOnlyHandler::process] from the [Scsi::poll] closure.
//!
//! START STOP UNIT is not decoded by the transport: it's failed as unsupported,
//! the medium returns to the filesystem when the device is deconfigured.
//!
//! [usbd-storage]: https://crates.io/crates/usbd-storage

use crate::backend::Backend;
use crate::fmt::{error, trace};
use crate::fs::Filesystem;
use crate::msc::Msc;
use core::borrow::BorrowMut;
use core::cmp::min;
use usb_device::bus::UsbBus;
use usbd_storage::subclass::scsi::{Scsi, ScsiCommand};
use usbd_storage::subclass::Command;
use usbd_storage::transport::bbb::{BulkOnly, BulkOnlyError};
use usbd_storage::transport::TransportError;

/// SCSI over Bulk Only Transport command
pub type BulkOnlyCommand<'a, 'alloc, Bus, Buf> =
    Command<'a, ScsiCommand, Scsi<BulkOnly<'alloc, Bus, Buf>>>;

type TransportResult = Result<(), TransportError<BulkOnlyError>>;

/// READ/WRITE parameters translated to the medium
#[derive(Copy, Clone)]
struct Transfer {
    lba: u32,
    /// Total number of bytes of the command
    total: usize,
    /// Bytes exchanged with the medium at once, a multiple of the sector size
    chunk: usize,
}

/// Serves [usbd-storage] SCSI commands through an [Msc] bridge
///
/// READ and WRITE span several calls. Data goes through an `N` bytes staging buffer,
/// in chunks of whole sectors.
///
/// [usbd-storage]: https://crates.io/crates/usbd-storage
pub struct BulkOnlyHandler<const N: usize> {
    stage: [u8; N],
    done: usize, // bytes of the command exchanged with the medium
    pos: usize,  // next byte of the stage to exchange with the transport
    len: usize,  // bytes of the current chunk
}

impl<const N: usize> BulkOnlyHandler<N> {
    pub const fn new() -> Self {
        Self {
            stage: [0u8; N],
            done: 0,
            pos: 0,
            len: 0,
        }
    }

    /// Drops the progress of the current command, e.g. after a USB reset
    pub fn reset(&mut self) {
        self.done = 0;
        self.pos = 0;
        self.len = 0;
    }

    /// Processes a single command
    ///
    /// May be called several times for the same command, until it's passed or failed.
    pub fn process<'alloc, Bus, Buf, B, F>(
        &mut self,
        msc: &mut Msc<B, F, N>,
        mut command: BulkOnlyCommand<'_, 'alloc, Bus, Buf>,
    ) -> TransportResult
    where
        Bus: UsbBus + 'alloc,
        Buf: BorrowMut<[u8]>,
        B: Backend,
        F: Filesystem,
    {
        match command.kind {
            ScsiCommand::TestUnitReady => {
                if msc.test_unit_ready() {
                    command.pass();
                } else {
                    command.fail();
                }
            }
            ScsiCommand::Inquiry { alloc_len, .. } => {
                let data = msc.inquiry().to_bytes();
                command.try_write_data_all(truncated(&data, alloc_len as usize))?;
                command.pass();
            }
            ScsiCommand::RequestSense { alloc_len, .. } => {
                let data = msc.request_sense().to_bytes();
                command.try_write_data_all(truncated(&data, alloc_len as usize))?;
                command.pass();
            }
            ScsiCommand::ReadCapacity10 => {
                let (count, size) = msc.capacity();
                let mut data = [0u8; 8];
                data[0..4].copy_from_slice(&count.saturating_sub(1).to_be_bytes()); // last LBA
                data[4..8].copy_from_slice(&size.to_be_bytes());
                command.try_write_data_all(&data)?;
                command.pass();
            }
            ScsiCommand::ReadCapacity16 { alloc_len } => {
                let (count, size) = msc.capacity();
                let mut data = [0u8; 32];
                data[0..8].copy_from_slice(&(count.saturating_sub(1) as u64).to_be_bytes());
                data[8..12].copy_from_slice(&size.to_be_bytes());
                command.try_write_data_all(truncated(&data, alloc_len as usize))?;
                command.pass();
            }
            ScsiCommand::ReadFormatCapacities { alloc_len } => {
                let (count, size) = msc.capacity();
                let mut data = [0u8; 12];
                data[3] = 0x08; // capacity list length
                data[4..8].copy_from_slice(&count.to_be_bytes());
                data[8] = 0x02; // formatted media
                data[9..12].copy_from_slice(&size.to_be_bytes()[1..]);
                command.try_write_data_all(truncated(&data, alloc_len as usize))?;
                command.pass();
            }
            ScsiCommand::ModeSense6 { .. } => {
                command.try_write_data_all(&[
                    0x03, // number of bytes that follow
                    0x00, // the media type is SBC
                    0x00, // not write-protected, no cache-control bytes support
                    0x00, // no mode-parameter block descriptors
                ])?;
                command.pass();
            }
            ScsiCommand::ModeSense10 { .. } => {
                command.try_write_data_all(&[0x00, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])?;
                command.pass();
            }
            ScsiCommand::Read { lba, len } => match Transfer::of(msc, lba, len) {
                Some(transfer) => return self.read(msc, command, transfer),
                None => {
                    self.reset();
                    command.fail();
                }
            },
            ScsiCommand::Write { lba, len } => match Transfer::of(msc, lba, len) {
                Some(transfer) => return self.write(msc, command, transfer),
                None => {
                    self.reset();
                    command.fail();
                }
            },
            _ => {
                error!("msc: bbb: Unsupported SCSI command");
                msc.reject();
                command.fail();
            }
        }

        Ok(())
    }

    fn read<'alloc, Bus, Buf, B, F>(
        &mut self,
        msc: &mut Msc<B, F, N>,
        mut command: BulkOnlyCommand<'_, 'alloc, Bus, Buf>,
        transfer: Transfer,
    ) -> TransportResult
    where
        Bus: UsbBus + 'alloc,
        Buf: BorrowMut<[u8]>,
        B: Backend,
        F: Filesystem,
    {
        if self.pos == self.len {
            // stage drained, load the next chunk
            self.done += self.len;
            self.pos = 0;
            self.len = 0;

            if self.done >= transfer.total {
                self.reset();
                command.pass();
                return Ok(());
            }

            let size = min(transfer.chunk, transfer.total - self.done);
            let read = match u32::try_from(self.done) {
                Ok(offset) => msc.read10(transfer.lba, offset, &mut self.stage[..size]),
                Err(_) => 0,
            };
            if read != size {
                error!("msc: bbb: Read failed at lba {} offset {}", transfer.lba, self.done);
                self.reset();
                command.fail();
                return Ok(());
            }
            self.len = size;
        }

        let count = command.write_data(&self.stage[self.pos..self.len])?;
        self.pos += count;
        trace!(
            "msc: bbb: Read progress {}/{}",
            self.done + self.pos,
            transfer.total
        );
        Ok(())
    }

    fn write<'alloc, Bus, Buf, B, F>(
        &mut self,
        msc: &mut Msc<B, F, N>,
        mut command: BulkOnlyCommand<'_, 'alloc, Bus, Buf>,
        transfer: Transfer,
    ) -> TransportResult
    where
        Bus: UsbBus + 'alloc,
        Buf: BorrowMut<[u8]>,
        B: Backend,
        F: Filesystem,
    {
        loop {
            if self.len == 0 {
                if self.done >= transfer.total {
                    self.reset();
                    command.pass();
                    return Ok(());
                }
                self.len = min(transfer.chunk, transfer.total - self.done);
                self.pos = 0;
            }

            let count = command.read_data(&mut self.stage[self.pos..self.len])?;
            self.pos += count;
            trace!(
                "msc: bbb: Write progress {}/{}",
                self.done + self.pos,
                transfer.total
            );

            if self.pos < self.len {
                // wait for more data from the host
                return Ok(());
            }

            // received a full chunk
            let accepted = match u32::try_from(self.done) {
                Ok(offset) => msc.write10(transfer.lba, offset, &self.stage[..self.len]),
                Err(_) => 0,
            };
            if accepted != self.len {
                error!("msc: bbb: Write rejected at lba {} offset {}", transfer.lba, self.done);
                self.reset();
                command.fail();
                return Ok(());
            }
            self.done += self.len;
            self.len = 0;
        }
    }
}

impl<const N: usize> Default for BulkOnlyHandler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl Transfer {
    /// Translates READ/WRITE parameters, `None` if they can't be served
    fn of<B: Backend, F: Filesystem, const N: usize>(
        msc: &Msc<B, F, N>,
        lba: u64,
        len: u64,
    ) -> Option<Self> {
        let (_, sector_size) = msc.capacity();
        let sector_size = sector_size as usize;
        if sector_size == 0 || sector_size > N {
            error!("msc: bbb: No medium to transfer from");
            return None;
        }
        Some(Self {
            lba: u32::try_from(lba).ok()?,
            total: usize::try_from(len).ok()?.checked_mul(sector_size)?,
            chunk: N - N % sector_size,
        })
    }
}

#[inline]
fn truncated(data: &[u8], alloc_len: usize) -> &[u8] {
    &data[..min(data.len(), alloc_len)]
}
