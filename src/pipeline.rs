//! Deferred write pipeline
//!
//! WRITE10 payloads are copied into a single-slot [WriteBuffer] from the command context and
//! written to the medium later, from the writer context (see [Storage::process_deferred]).
//! The slot is the whole hand-off: capacity one, matching one SCSI command in flight.
//!
//! [Storage::process_deferred]: crate::storage::Storage::process_deferred

use crate::fmt::trace;

/// Alignment of the write buffer data, in bytes
pub const MEM_ALIGN: usize = 4;

/// Default transfer buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 512;

#[repr(C, align(4))]
struct Block<const N: usize>([u8; N]);

/// Location and length of the write waiting in a [WriteBuffer]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingWrite {
    pub lba: u32,
    /// Byte offset within `lba`
    pub offset: u32,
    pub len: u32,
}

/// Single pending write request
///
/// `N` is the transfer size. It must be a non-zero multiple of [MEM_ALIGN], which is checked at
/// compile time. The data block is word aligned so a DMA engine can read it directly, provided
/// the owner lives in a DMA-capable memory region.
pub struct WriteBuffer<const N: usize> {
    data: Block<N>,
    lba: u32,
    offset: u32,
    len: u32,
    pending: bool,
}

impl<const N: usize> WriteBuffer<N> {
    /// Number of bytes a single request may carry
    pub const CAPACITY: usize = N;

    const VALID_SIZE: () = assert!(
        N > 0 && N % MEM_ALIGN == 0,
        "write buffer size must be a non-zero multiple of MEM_ALIGN"
    );

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_SIZE;
        Self {
            data: Block([0u8; N]),
            lba: 0,
            offset: 0,
            len: 0,
            pending: false,
        }
    }

    /// Stores a request, returning the number of bytes accepted
    ///
    /// # Panics
    /// Panics if `src` does not fit the buffer. Nothing is copied in that case.
    pub fn submit(&mut self, lba: u32, offset: u32, src: &[u8]) -> u32 {
        assert!(
            src.len() <= N,
            "write of {} bytes exceeds buffer capacity of {} bytes",
            src.len(),
            N
        );
        self.data.0[..src.len()].copy_from_slice(src);
        self.lba = lba;
        self.offset = offset;
        self.len = src.len() as u32;
        self.pending = true;
        trace!(
            "msc: pipeline: Queued lba {} offset {} len {}",
            lba,
            offset,
            self.len
        );
        self.len
    }

    /// Whether a request waits to be written
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Hands the pending request over to the writer, freeing the slot
    ///
    /// The payload stays readable through [payload] until the next [submit].
    ///
    /// [payload]: WriteBuffer::payload
    /// [submit]: WriteBuffer::submit
    pub fn take(&mut self) -> Option<PendingWrite> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some(PendingWrite {
            lba: self.lba,
            offset: self.offset,
            len: self.len,
        })
    }

    /// Payload of a request returned by [take]
    ///
    /// [take]: WriteBuffer::take
    pub fn payload(&self, request: &PendingWrite) -> &[u8] {
        &self.data.0[..request.len as usize]
    }

    /// Address of the data block, for DMA placement checks
    pub fn as_ptr(&self) -> *const u8 {
        self.data.0.as_ptr()
    }
}

impl<const N: usize> Default for WriteBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
