//! USB Mass Storage block bridge
//!
//! Shares a block medium between a USB host and the local FAT filesystem. The medium is owned
//! by exactly one of them at a time: while the volume is mounted the host sees no medium,
//! while the host uses the medium the volume is unmounted.
//!
//! # Layers
//! * [Backends] - uniform sector interface over a wear-leveled flash partition or an SD/MMC card
//! * [Storage] - the session: mount state machine, callbacks and the deferred write pipeline
//! * [Msc] - SCSI entry points for a USB Mass Storage transport
//! * [BulkOnlyHandler] - drives a [usbd-storage] Bulk Only SCSI transport through the bridge
//!
//! The filesystem and the media drivers are external, see [Filesystem], [WearLevelling] and
//! [Card].
//!
//! # Features
//! | Feature | Description                           |
//! | ------- |---------------------------------------|
//! | `bbb` | Include the [usbd-storage] Bulk Only Transport adapter |
//! | `defmt` | Enable logging via [defmt](https://crates.io/crates/defmt) crate |
//!
//! # Example
//! ```ignore
//! let storage = Storage::<_, _, 512>::new(FlashBackend::new(wl), fatfs, Config::default())?;
//! let mut msc = Msc::default();
//! msc.init(storage)?;
//! msc.mount(None)?;
//!
//! loop {
//!     if usb_device.poll(&mut [&mut scsi]) {
//!         let _ = scsi.poll(|command| {
//!             let _ = handler.process(&mut msc, command);
//!         });
//!     }
//!     msc.device_state_changed(usb_device.state());
//!     msc.process_deferred();
//! }
//! ```
//!
//! [Backends]: crate::backend
//! [Storage]: crate::storage::Storage
//! [Msc]: crate::msc::Msc
//! [BulkOnlyHandler]: crate::transport::BulkOnlyHandler
//! [Filesystem]: crate::fs::Filesystem
//! [WearLevelling]: crate::backend::flash::WearLevelling
//! [Card]: crate::backend::card::Card
//! [usbd-storage]: https://crates.io/crates/usbd-storage

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub(crate) mod fmt;

pub mod backend;
pub mod error;
pub mod fs;
pub mod msc;
pub mod pipeline;
pub mod scsi;
pub mod storage;
#[cfg(feature = "bbb")]
pub mod transport;

pub use error::{Error, FsError};
pub use msc::Msc;
pub use storage::{Config, EventType, MscEvent, Storage};
