//! Storage session
//!
//! [Storage] binds a [Backend] to the [Filesystem] and decides who owns the medium:
//! * mounted - the local FAT filesystem, raw sector writes are refused
//! * unmounted - the USB host, through the [MSC bridge]
//!
//! Only one session is expected to exist at a time. The [MSC bridge] provides the slot
//! a USB transport reaches it through.
//!
//! [MSC bridge]: crate::msc::Msc

use crate::backend::Backend;
use crate::error::{Error, FsError};
use crate::fmt::{debug, error, info, warn};
use crate::fs::{allocation_unit_size, Drive, Filesystem, FormatParams, FormatType, MountMode};
use crate::pipeline::{WriteBuffer, DEFAULT_BUFFER_SIZE};
use alloc::string::String;
use alloc::vec::Vec;

/// Default mount point of the FAT volume
pub const DEFAULT_BASE_PATH: &str = "/data";

/// Default number of files that can be open at once
pub const DEFAULT_MAX_FILES: usize = 2;

/// Scratch memory handed to the filesystem to format a blank medium
const FORMAT_WORKBUF_SIZE: usize = 4096;

/// Kind of a mount state notification
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventType {
    /// Fired after a mount state transition completed
    MountChanged,
    /// Fired before a mount state transition starts
    PremountChanged,
}

/// Mount state notification
///
/// `is_mounted` holds the state before the transition for [EventType::PremountChanged]
/// and the state after it for [EventType::MountChanged].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MscEvent {
    pub kind: EventType,
    pub is_mounted: bool,
}

/// Mount state notification handler
pub type Callback = fn(&MscEvent);

/// Session configuration
#[derive(Copy, Clone)]
pub struct Config {
    /// Maximum number of files open at once. `0` selects [DEFAULT_MAX_FILES]
    pub max_files: usize,
    /// FAT variant used when a blank medium gets formatted
    pub format: FormatType,
    /// Format without a partition table
    pub single_partition: bool,
    /// Mount point used when [Storage::mount] is called without one
    pub base_path: &'static str,
    pub callback_mount_changed: Option<Callback>,
    pub callback_premount_changed: Option<Callback>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            format: FormatType::Any,
            single_partition: false,
            base_path: DEFAULT_BASE_PATH,
            callback_mount_changed: None,
            callback_premount_changed: None,
        }
    }
}

/// Storage session
///
/// `N` is the transfer buffer size, see [WriteBuffer].
pub struct Storage<B: Backend, F: Filesystem, const N: usize = DEFAULT_BUFFER_SIZE> {
    backend: B,
    fs: F,
    buffer: WriteBuffer<N>,
    is_fat_mounted: bool,
    base_path: Option<String>,
    default_base_path: &'static str,
    max_files: usize,
    format: FormatType,
    single_partition: bool,
    callback_mount_changed: Option<Callback>,
    callback_premount_changed: Option<Callback>,
}

impl<B: Backend, F: Filesystem, const N: usize> Storage<B, F, N> {
    /// Creates an unmounted session
    ///
    /// # Errors
    /// [Error::NotSupported] if a single sector doesn't fit the transfer buffer
    pub fn new(backend: B, fs: F, config: Config) -> Result<Self, Error> {
        let sector_size = backend.sector_size();
        if sector_size as usize > N {
            error!(
                "msc: storage: Buffer size {} must be at least the sector size {}",
                N, sector_size
            );
            return Err(Error::NotSupported);
        }

        info!(
            "msc: storage: Init, sectors: {}, sector size: {}",
            backend.sector_count(),
            sector_size
        );

        Ok(Self {
            backend,
            fs,
            buffer: WriteBuffer::new(),
            is_fat_mounted: false,
            base_path: None,
            default_base_path: config.base_path,
            max_files: if config.max_files > 0 {
                config.max_files
            } else {
                DEFAULT_MAX_FILES
            },
            format: config.format,
            single_partition: config.single_partition,
            callback_mount_changed: config.callback_mount_changed,
            callback_premount_changed: config.callback_premount_changed,
        })
    }

    /// Mounts the FAT volume, handing the medium to the local filesystem
    ///
    /// Formats the medium if it carries no filesystem. Does nothing if already mounted.
    /// A host write still waiting in the pipeline is written first.
    ///
    /// # Arguments
    /// * `base_path` - mount point, [Config::base_path] if `None`
    ///
    /// # Errors
    /// * [Error::ResourceExhausted] - no free drive slot
    /// * [Error::NoMemory] - no memory to format
    /// * [Error::Failure] - the filesystem refused to mount or format
    /// * any error of [Backend::mount]
    pub fn mount(&mut self, base_path: Option<&str>) -> Result<(), Error> {
        if self.is_fat_mounted {
            return Ok(());
        }

        if let Some(Err(err)) = self.process_deferred() {
            warn!("msc: storage: Pending write dropped before mount: {}", err);
        }

        self.notify(EventType::PremountChanged);

        let base_path = base_path.unwrap_or(self.default_base_path);
        let drive = self.fs.alloc_drive().map_err(|err| {
            error!("msc: storage: The maximum count of volumes is already mounted");
            err
        })?;

        let mut registered = false;
        if let Err(err) = self.mount_drive(drive, base_path, &mut registered) {
            if registered {
                let _ = self.fs.unregister(base_path);
            }
            self.fs.detach(drive);
            self.is_fat_mounted = false;
            warn!("msc: storage: Failed to mount storage: {}", err);
            return Err(err);
        }

        self.is_fat_mounted = true;
        self.base_path = Some(String::from(base_path));
        info!("msc: storage: Mounted at {}", base_path);

        self.notify(EventType::MountChanged);
        Ok(())
    }

    /// Unmounts the FAT volume, handing the medium to the USB host
    ///
    /// Does nothing if not mounted.
    ///
    /// # Errors
    /// * [Error::InvalidState] - the medium is not bound to any drive, state is left unchanged
    /// * the VFS unregistration error, after the state has changed
    pub fn unmount(&mut self) -> Result<(), Error> {
        if !self.is_fat_mounted {
            return Ok(());
        }

        self.notify(EventType::PremountChanged);

        self.backend.unmount(&mut self.fs)?;
        let res = match self.base_path.take() {
            Some(path) => self.fs.unregister(&path).map_err(Error::from),
            None => Ok(()),
        };
        self.is_fat_mounted = false;
        info!("msc: storage: Unmounted");

        self.notify(EventType::MountChanged);
        res
    }

    /// Reads sectors synchronously
    pub fn read(&mut self, lba: u32, offset: u32, dest: &mut [u8]) -> Result<(), Error> {
        let sector_size = self.backend.sector_size();
        self.backend.read(sector_size, lba, offset, dest)
    }

    /// Queues a host write and returns the number of bytes accepted
    ///
    /// The medium is written later by [process_deferred]. If an earlier write is still queued,
    /// it's written first so the medium sees writes in arrival order.
    ///
    /// # Panics
    /// Panics if `data` is larger than the transfer buffer.
    ///
    /// [process_deferred]: Storage::process_deferred
    pub fn write10(&mut self, lba: u32, offset: u32, data: &[u8]) -> usize {
        assert!(
            data.len() <= N,
            "write10 of {} bytes exceeds buffer capacity",
            data.len()
        );
        if self.buffer.is_pending() {
            debug!("msc: storage: Flushing previous write");
            let _ = self.process_deferred();
        }
        self.buffer.submit(lba, offset, data) as usize
    }

    /// Writes the queued host write, if any
    ///
    /// This is the writer task. Failures are logged and reported, never retried.
    ///
    /// # Returns
    /// `None` if nothing was queued
    pub fn process_deferred(&mut self) -> Option<Result<(), Error>> {
        let request = self.buffer.take()?;
        let res = Self::write_sectors(
            &mut self.backend,
            self.is_fat_mounted,
            request.lba,
            request.offset,
            self.buffer.payload(&request),
        );
        if let Err(err) = res {
            error!("msc: storage: Write failed: {}", err);
        }
        Some(res)
    }

    fn write_sectors(
        backend: &mut B,
        is_fat_mounted: bool,
        lba: u32,
        offset: u32,
        src: &[u8],
    ) -> Result<(), Error> {
        if is_fat_mounted {
            error!("msc: storage: Can't write, FAT mounted");
            return Err(Error::InvalidState);
        }
        let sector_size = backend.sector_size();
        if sector_size == 0 || src.len() % sector_size as usize != 0 {
            error!(
                "msc: storage: Invalid argument lba {} offset {} size {} sector_size {}",
                lba,
                offset,
                src.len(),
                sector_size
            );
            return Err(Error::InvalidArg);
        }
        backend.write(sector_size, lba, offset, src)
    }

    fn mount_drive(
        &mut self,
        drive: Drive,
        base_path: &str,
        registered: &mut bool,
    ) -> Result<(), Error> {
        self.backend.mount(&mut self.fs, drive).map_err(|err| {
            error!("msc: storage: Failed to attach drive {}", drive.0);
            err
        })?;

        match self.fs.register(base_path, drive, self.max_files) {
            Ok(()) => *registered = true,
            // someone else's registration, left in place on failure
            Err(FsError::AlreadyRegistered) => {
                debug!("msc: storage: Already registered with VFS");
            }
            Err(err) => {
                error!("msc: storage: VFS registration failed: {}", err);
                return Err(err.into());
            }
        }

        self.mount_or_format(drive)
    }

    fn mount_or_format(&mut self, drive: Drive) -> Result<(), Error> {
        match self.fs.mount(drive, MountMode::Immediate) {
            Ok(()) => return Ok(()),
            Err(err @ (FsError::NoFilesystem | FsError::Internal)) => {
                warn!("msc: storage: Mount failed ({}), formatting", err);
            }
            Err(err) => {
                warn!("msc: storage: Mount failed ({})", err);
                return Err(Error::Failure);
            }
        }

        let mut work = Vec::new();
        work.try_reserve_exact(FORMAT_WORKBUF_SIZE)
            .map_err(|_| Error::NoMemory)?;
        work.resize(FORMAT_WORKBUF_SIZE, 0u8);

        let au_size = allocation_unit_size(self.backend.sector_size(), FORMAT_WORKBUF_SIZE as u32);
        warn!(
            "msc: storage: Formatting medium, allocation unit size {}",
            au_size
        );
        let params = FormatParams::new(self.format, self.single_partition, au_size);
        self.fs.format(drive, &params, &mut work).map_err(|err| {
            error!("msc: storage: Format failed: {}", err);
            Error::Failure
        })?;
        drop(work);

        self.fs.mount(drive, MountMode::Deferred).map_err(|err| {
            error!("msc: storage: Mount failed after formatting: {}", err);
            Error::Failure
        })
    }

    fn notify(&self, kind: EventType) {
        let callback = match kind {
            EventType::MountChanged => self.callback_mount_changed,
            EventType::PremountChanged => self.callback_premount_changed,
        };
        if let Some(callback) = callback {
            callback(&MscEvent {
                kind,
                is_mounted: self.is_fat_mounted,
            });
        }
    }

    /// Sets the handler of `kind` events, replacing the previous one
    pub fn register_callback(&mut self, kind: EventType, callback: Callback) {
        match kind {
            EventType::MountChanged => self.callback_mount_changed = Some(callback),
            EventType::PremountChanged => self.callback_premount_changed = Some(callback),
        }
    }

    /// Clears the handler of `kind` events
    pub fn unregister_callback(&mut self, kind: EventType) {
        match kind {
            EventType::MountChanged => self.callback_mount_changed = None,
            EventType::PremountChanged => self.callback_premount_changed = None,
        }
    }

    pub fn sector_count(&self) -> u32 {
        self.backend.sector_count()
    }

    pub fn sector_size(&self) -> u32 {
        self.backend.sector_size()
    }

    /// Whether the FAT volume is mounted
    pub fn is_mounted(&self) -> bool {
        self.is_fat_mounted
    }

    /// Whether the medium is exposed to the USB host
    pub fn in_use_by_usb_host(&self) -> bool {
        !self.is_fat_mounted
    }

    /// Mount point, if mounted
    pub fn base_path(&self) -> Option<&str> {
        self.base_path.as_deref()
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Whether a host write waits in the pipeline
    pub fn has_pending_write(&self) -> bool {
        self.buffer.is_pending()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    pub fn filesystem_mut(&mut self) -> &mut F {
        &mut self.fs
    }
}
