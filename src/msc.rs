//! MSC protocol bridge
//!
//! [Msc] is the entry point of a USB Mass Storage transport. It maps SCSI primitives and USB
//! device state changes onto the [Storage] session and arbitrates the medium:
//! * while the FAT volume is mounted, the unit reports "medium not present" to the host
//! * once the host claims the unit, the volume is unmounted and raw sector I/O is served
//! * when the host ejects the medium or goes away, the volume is mounted again
//!
//! Mount transitions triggered by the host are best effort: failures are only logged,
//! the SCSI protocol has no way to report them beyond the ready bit.

use crate::backend::Backend;
use crate::error::Error;
use crate::fmt::{debug, error, info, warn};
use crate::fs::Filesystem;
use crate::pipeline::DEFAULT_BUFFER_SIZE;
use crate::scsi::{Identity, Opcode, Sense};
use crate::storage::Storage;
use usb_device::device::UsbDeviceState;

/// USB Mass Storage bridge
///
/// Holds at most one [Storage] session.
pub struct Msc<B: Backend, F: Filesystem, const N: usize = DEFAULT_BUFFER_SIZE> {
    storage: Option<Storage<B, F, N>>,
    identity: Identity,
    sense: Sense,
    configured: bool,
}

impl<B: Backend, F: Filesystem, const N: usize> Msc<B, F, N> {
    /// Creates a bridge without a session
    pub fn new(identity: Identity) -> Self {
        Self {
            storage: None,
            identity,
            sense: Sense::NONE,
            configured: false,
        }
    }

    /// Installs the session
    ///
    /// # Errors
    /// [Error::InvalidState] if a session is already installed
    pub fn init(&mut self, storage: Storage<B, F, N>) -> Result<(), Error> {
        if self.storage.is_some() {
            error!("msc: bridge: Storage already initialized");
            return Err(Error::InvalidState);
        }
        self.storage = Some(storage);
        Ok(())
    }

    /// Removes and returns the session
    pub fn deinit(&mut self) -> Option<Storage<B, F, N>> {
        self.storage.take()
    }

    pub fn storage(&self) -> Option<&Storage<B, F, N>> {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> Option<&mut Storage<B, F, N>> {
        self.storage.as_mut()
    }

    /// [Storage::mount]
    ///
    /// # Errors
    /// [Error::InvalidState] if no session is installed
    pub fn mount(&mut self, base_path: Option<&str>) -> Result<(), Error> {
        self.storage
            .as_mut()
            .ok_or(Error::InvalidState)?
            .mount(base_path)
    }

    /// [Storage::unmount]
    ///
    /// # Errors
    /// [Error::Failure] if no session is installed
    pub fn unmount(&mut self) -> Result<(), Error> {
        self.storage.as_mut().ok_or(Error::Failure)?.unmount()
    }

    /// INQUIRY
    pub fn inquiry(&self) -> &Identity {
        &self.identity
    }

    /// TEST UNIT READY
    ///
    /// While the FAT volume is mounted, sets NOT READY / MEDIUM NOT PRESENT and reports
    /// the unit as not ready. Otherwise makes sure the volume is unmounted and reports ready,
    /// whatever the unmount outcome.
    pub fn test_unit_ready(&mut self) -> bool {
        let mounted = self
            .storage
            .as_ref()
            .map_or(true, |storage| storage.is_mounted());

        if mounted {
            self.sense = Sense::MEDIUM_NOT_PRESENT;
            return false;
        }

        if let Err(err) = self.unmount() {
            warn!("msc: bridge: test_unit_ready unmount failed: {}", err);
        }
        true
    }

    /// READ CAPACITY: `(sector count, sector size)`
    pub fn capacity(&self) -> (u32, u32) {
        self.storage.as_ref().map_or((0, 0), |storage| {
            (storage.sector_count(), storage.sector_size())
        })
    }

    /// START STOP UNIT
    ///
    /// An eject (`load_eject` without `start`) hands the medium back to the filesystem.
    /// Always succeeds from the host's point of view.
    pub fn start_stop(&mut self, power_condition: u8, start: bool, load_eject: bool) -> bool {
        debug!(
            "msc: bridge: start_stop power_condition {} start {} load_eject {}",
            power_condition, start, load_eject
        );
        if load_eject && !start {
            if let Err(err) = self.mount(None) {
                warn!("msc: bridge: start_stop mount failed: {}", err);
            }
        }
        true
    }

    /// READ10, returning the number of bytes read, `0` on error
    pub fn read10(&mut self, lba: u32, offset: u32, buf: &mut [u8]) -> usize {
        let res = match self.storage.as_mut() {
            Some(storage) => storage.read(lba, offset, buf),
            None => Err(Error::InvalidState),
        };
        match res {
            Ok(()) => buf.len(),
            Err(err) => {
                error!("msc: bridge: read10 failed: {}", err);
                0
            }
        }
    }

    /// WRITE10, returning the number of bytes accepted
    ///
    /// The write is deferred, see [Storage::write10]. Without a session nothing is accepted.
    ///
    /// # Panics
    /// Panics if `buf` is larger than the transfer buffer.
    pub fn write10(&mut self, lba: u32, offset: u32, buf: &[u8]) -> usize {
        match self.storage.as_mut() {
            Some(storage) => storage.write10(lba, offset, buf),
            None => {
                error!("msc: bridge: write10 without storage");
                0
            }
        }
    }

    /// Writes the queued host write, see [Storage::process_deferred]
    pub fn process_deferred(&mut self) -> Option<Result<(), Error>> {
        self.storage.as_mut()?.process_deferred()
    }

    /// Any SCSI command without a dedicated entry point
    ///
    /// # Returns
    /// The number of bytes of `buf` used, or `None` if the command is not supported. The
    /// transport is then expected to stall the endpoint and fail the command.
    pub fn scsi(&mut self, cdb: &[u8], _buf: &mut [u8]) -> Option<usize> {
        let code = *cdb.first()?;
        match Opcode::try_from(code) {
            // the medium stays removable, the host's preference is not enforced
            Ok(Opcode::PreventAllowMediumRemoval) => Some(0),
            _ => {
                warn!("msc: bridge: Unsupported SCSI command {:#X}", code);
                self.reject();
                None
            }
        }
    }

    /// Records an ILLEGAL REQUEST / INVALID COMMAND OPERATION CODE sense
    ///
    /// For transports that decode commands themselves and hit one the bridge doesn't serve.
    pub fn reject(&mut self) {
        self.sense = Sense::INVALID_COMMAND;
    }

    /// Current sense data
    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// REQUEST SENSE: returns the current sense data and clears it
    pub fn request_sense(&mut self) -> Sense {
        core::mem::replace(&mut self.sense, Sense::NONE)
    }

    /// The USB interface got configured: the host takes the medium
    pub fn device_mounted(&mut self) {
        info!("msc: bridge: Device mounted");
        if let Err(err) = self.unmount() {
            warn!("msc: bridge: Device mount, unmount failed: {}", err);
        }
    }

    /// The USB interface got deconfigured: the filesystem takes the medium back
    pub fn device_unmounted(&mut self) {
        info!("msc: bridge: Device unmounted");
        if let Err(err) = self.mount(None) {
            warn!("msc: bridge: Device unmount, mount failed: {}", err);
        }
    }

    /// Feeds the USB device state, calling [device_mounted] or [device_unmounted] on changes
    ///
    /// Suspend keeps the current owner.
    ///
    /// [device_mounted]: Msc::device_mounted
    /// [device_unmounted]: Msc::device_unmounted
    pub fn device_state_changed(&mut self, state: UsbDeviceState) {
        match state {
            UsbDeviceState::Configured if !self.configured => {
                self.configured = true;
                self.device_mounted();
            }
            UsbDeviceState::Default | UsbDeviceState::Addressed if self.configured => {
                self.configured = false;
                self.device_unmounted();
            }
            _ => {}
        }
    }
}

impl<B: Backend, F: Filesystem, const N: usize> Default for Msc<B, F, N> {
    fn default() -> Self {
        Self::new(Identity::default())
    }
}
