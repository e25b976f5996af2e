#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::mpsc::sync_channel;
use std::thread;
use std::time::Duration;
use usbd_msc_storage::backend::card::{Card, CardBackend};
use usbd_msc_storage::backend::flash::{FlashBackend, WearLevelling};
use usbd_msc_storage::fs::{Disk, Drive, Filesystem, FormatParams, MountMode};
use usbd_msc_storage::storage::{Config, MscEvent, Storage};
use usbd_msc_storage::{Error, FsError};


pub const SECTOR_SIZE: usize = 512;
pub const SECTOR_COUNT: usize = 2048;

pub type FlashStorage = Storage<FlashBackend<RamFlash>, MockFs, SECTOR_SIZE>;
pub type CardStorage = Storage<CardBackend<RamCard>, MockFs, SECTOR_SIZE>;

/// Wear-levelled partition kept in RAM
///
/// Writing a byte that wasn't erased first fails, like real NOR flash would.
pub struct RamFlash {
    pub data: Vec<u8>,
    pub sector_size: usize,
    pub erases: usize,
    pub writes: usize,
}

impl RamFlash {
    pub fn new(sector_size: usize, sector_count: usize) -> Self {
        Self {
            data: vec![0xFF; sector_size * sector_count],
            sector_size,
            erases: 0,
            writes: 0,
        }
    }

    fn range(&self, addr: usize, len: usize) -> Result<std::ops::Range<usize>, Error> {
        match addr.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(addr..end),
            _ => Err(Error::InvalidSize),
        }
    }
}

impl WearLevelling for RamFlash {
    fn handle(&self) -> u32 {
        7
    }

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, addr: usize, dest: &mut [u8]) -> Result<(), Error> {
        let range = self.range(addr, dest.len())?;
        dest.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn erase_range(&mut self, addr: usize, len: usize) -> Result<(), Error> {
        let range = self.range(addr, len)?;
        self.data[range].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, addr: usize, src: &[u8]) -> Result<(), Error> {
        let range = self.range(addr, src.len())?;
        if self.data[range.clone()].iter().any(|b| *b != 0xFF) {
            return Err(Error::Failure);
        }
        self.data[range].copy_from_slice(src);
        self.writes += 1;
        Ok(())
    }
}

/// SD card kept in RAM
pub struct RamCard {
    pub data: Vec<u8>,
    pub sector_size: u32,
    pub capacity: u32,
    /// `(start, count)` of every sector write
    pub writes: Vec<(u32, u32)>,
}

impl RamCard {
    /// A card claiming `capacity` sectors, only the first `backed` of them are kept in memory
    pub fn new(capacity: u32, backed: usize) -> Self {
        Self {
            data: vec![0u8; SECTOR_SIZE * backed],
            sector_size: SECTOR_SIZE as u32,
            capacity,
            writes: vec![],
        }
    }

    fn range(&self, start: u32, count: u32) -> Result<std::ops::Range<usize>, Error> {
        let ss = self.sector_size as usize;
        let begin = start as usize * ss;
        let end = begin + count as usize * ss;
        if end <= self.data.len() {
            Ok(begin..end)
        } else {
            Err(Error::InvalidSize)
        }
    }
}

impl Card for RamCard {
    fn handle(&self) -> u32 {
        3
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_sectors(&mut self, dest: &mut [u8], start: u32, count: u32) -> Result<(), Error> {
        let range = self.range(start, count)?;
        dest.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sectors(&mut self, src: &[u8], start: u32, count: u32) -> Result<(), Error> {
        let range = self.range(start, count)?;
        self.data[range].copy_from_slice(src);
        self.writes.push((start, count));
        Ok(())
    }
}

/// Filesystem double: drive registry, VFS registrations and FAT volumes in memory
pub struct MockFs {
    pub drives: Vec<Option<Disk>>,
    pub registrations: Vec<(String, Drive, usize)>,
    pub volumes: Vec<Drive>,
    pub status_checks: Vec<(Drive, bool)>,
    /// Whether the medium carries a FAT volume
    pub formatted: bool,
    pub formats: Vec<FormatParams>,
    /// Logical drive names handed to the FAT formatter, e.g. `0:`
    pub formatted_drives: Vec<[u8; 2]>,
    pub format_workbuf_len: usize,
    pub fail_mount: Option<FsError>,
    pub fail_format: Option<FsError>,
    pub fail_register: Option<FsError>,
}

impl MockFs {
    pub fn new(slots: usize) -> Self {
        Self {
            drives: vec![None; slots],
            registrations: vec![],
            volumes: vec![],
            status_checks: vec![],
            formatted: false,
            formats: vec![],
            formatted_drives: vec![],
            format_workbuf_len: 0,
            fail_mount: None,
            fail_format: None,
            fail_register: None,
        }
    }

    pub fn blank() -> Self {
        Self::new(2)
    }

    pub fn formatted() -> Self {
        Self {
            formatted: true,
            ..Self::new(2)
        }
    }

    pub fn attached(&self) -> usize {
        self.drives.iter().filter(|d| d.is_some()).count()
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.registrations.iter().any(|(p, _, _)| p == path)
    }
}

impl Filesystem for MockFs {
    fn alloc_drive(&mut self) -> Result<Drive, Error> {
        self.drives
            .iter()
            .position(|d| d.is_none())
            .map(|i| Drive(i as u8))
            .ok_or(Error::ResourceExhausted)
    }

    fn attach(&mut self, drive: Drive, disk: Disk) -> Result<(), Error> {
        let slot = self
            .drives
            .get_mut(drive.0 as usize)
            .ok_or(Error::InvalidArg)?;
        if slot.is_some() {
            return Err(Error::InvalidState);
        }
        *slot = Some(disk);
        Ok(())
    }

    fn detach(&mut self, drive: Drive) {
        if let Some(slot) = self.drives.get_mut(drive.0 as usize) {
            *slot = None;
        }
    }

    fn drive_of(&self, disk: Disk) -> Option<Drive> {
        self.drives
            .iter()
            .position(|d| *d == Some(disk))
            .map(|i| Drive(i as u8))
    }

    fn set_status_check(&mut self, drive: Drive, enabled: bool) {
        self.status_checks.push((drive, enabled));
    }

    fn register(
        &mut self,
        base_path: &str,
        drive: Drive,
        max_files: usize,
    ) -> Result<(), FsError> {
        if let Some(err) = self.fail_register {
            return Err(err);
        }
        if self.is_registered(base_path) {
            return Err(FsError::AlreadyRegistered);
        }
        self.registrations
            .push((base_path.to_string(), drive, max_files));
        Ok(())
    }

    fn unregister(&mut self, base_path: &str) -> Result<(), FsError> {
        let before = self.registrations.len();
        self.registrations.retain(|(p, _, _)| p != base_path);
        if self.registrations.len() == before {
            Err(FsError::Failure)
        } else {
            Ok(())
        }
    }

    fn mount(&mut self, drive: Drive, mode: MountMode) -> Result<(), FsError> {
        if let Some(err) = self.fail_mount {
            return Err(err);
        }
        if mode == MountMode::Immediate && !self.formatted {
            return Err(FsError::NoFilesystem);
        }
        self.volumes.push(drive);
        Ok(())
    }

    fn unmount(&mut self, drive: Drive) {
        self.volumes.retain(|d| *d != drive);
    }

    fn format(
        &mut self,
        drive: Drive,
        params: &FormatParams,
        work: &mut [u8],
    ) -> Result<(), FsError> {
        if let Some(err) = self.fail_format {
            return Err(err);
        }
        self.format_workbuf_len = work.len();
        self.formats.push(*params);
        self.formatted_drives.push(drive.name());
        self.formatted = true;
        Ok(())
    }
}

thread_local! {
    static EVENTS: RefCell<Vec<MscEvent>> = RefCell::new(vec![]);
}

/// Mount state callback recording every event of the current thread
pub fn record(event: &MscEvent) {
    EVENTS.with(|events| events.borrow_mut().push(*event));
}

/// Drains the events recorded on the current thread
pub fn take_events() -> Vec<MscEvent> {
    EVENTS.with(|events| events.borrow_mut().drain(..).collect())
}

pub fn recording_config() -> Config {
    Config {
        callback_mount_changed: Some(record),
        callback_premount_changed: Some(record),
        ..Config::default()
    }
}

pub fn flash_storage(fs: MockFs) -> FlashStorage {
    take_events();
    let flash = RamFlash::new(SECTOR_SIZE, SECTOR_COUNT);
    Storage::new(FlashBackend::new(flash), fs, recording_config()).unwrap()
}

pub fn card_storage(card: RamCard, fs: MockFs) -> CardStorage {
    take_events();
    Storage::new(CardBackend::new(card), fs, recording_config()).unwrap()
}

pub fn timeout<F, T>(timeout: Duration, f: F)
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = sync_channel(0);
    thread::spawn(move || {
        f();
        tx.send(()).unwrap();
    });
    rx.recv_timeout(timeout).expect("timeout");
}
