//! SCSI definitions used by the bridge
//!
//! Refer to specifications (SPC,SBC)

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// SCSI operation codes the bridge knows about
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    /* SPC */
    TestUnitReady = 0x00,
    RequestSense = 0x03,
    Inquiry = 0x12,
    ModeSense6 = 0x1A,
    StartStopUnit = 0x1B,
    PreventAllowMediumRemoval = 0x1E,
    ModeSense10 = 0x5A,

    /* SBC */
    ReadCapacity10 = 0x25,
    Read10 = 0x28,
    Write10 = 0x2A,
    ReadCapacity16 = 0x9E,

    /* MMC */
    ReadFormatCapacities = 0x23,
}

/// Sense key
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SenseKey {
    NoSense = 0x00,
    RecoveredError = 0x01,
    NotReady = 0x02,
    MediumError = 0x03,
    HardwareError = 0x04,
    IllegalRequest = 0x05,
    UnitAttention = 0x06,
    DataProtect = 0x07,
}

impl Default for SenseKey {
    fn default() -> Self {
        SenseKey::NoSense
    }
}

/// ASC: medium not present
pub const ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;
/// ASC: invalid command operation code
pub const ASC_INVALID_COMMAND_OPERATION_CODE: u8 = 0x20;
/// ASCQ shared by the codes above
pub const ASCQ_NONE: u8 = 0x00;

/// Fixed format sense data length
pub const SENSE_DATA_LEN: usize = 18;

/// Standard inquiry data length
pub const INQUIRY_DATA_LEN: usize = 36;

/// Sense data reported by REQUEST SENSE
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sense {
    pub key: SenseKey,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub const NONE: Sense = Sense {
        key: SenseKey::NoSense,
        asc: 0,
        ascq: 0,
    };

    /// The medium is owned by the local filesystem
    pub const MEDIUM_NOT_PRESENT: Sense = Sense {
        key: SenseKey::NotReady,
        asc: ASC_MEDIUM_NOT_PRESENT,
        ascq: ASCQ_NONE,
    };

    /// Unsupported command
    pub const INVALID_COMMAND: Sense = Sense {
        key: SenseKey::IllegalRequest,
        asc: ASC_INVALID_COMMAND_OPERATION_CODE,
        ascq: ASCQ_NONE,
    };

    /// Fixed format sense data
    pub fn to_bytes(&self) -> [u8; SENSE_DATA_LEN] {
        let mut data = [0u8; SENSE_DATA_LEN];
        data[0] = 0x70; // current errors, fixed format
        data[2] = self.key.into();
        data[7] = (SENSE_DATA_LEN - 8) as u8; // additional sense length
        data[12] = self.asc;
        data[13] = self.ascq;
        data
    }
}

/// Device identification returned by INQUIRY
///
/// Fields are space padded ASCII, as required by SPC.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Identity {
    pub vendor_id: [u8; 8],
    pub product_id: [u8; 16],
    pub product_rev: [u8; 4],
}

impl Identity {
    /// Builds an identity, truncating each string to its field size
    pub fn new(vendor: &str, product: &str, revision: &str) -> Self {
        Self {
            vendor_id: padded(vendor),
            product_id: padded(product),
            product_rev: padded(revision),
        }
    }

    /// Standard inquiry data of a removable direct-access device
    pub fn to_bytes(&self) -> [u8; INQUIRY_DATA_LEN] {
        let mut data = [0u8; INQUIRY_DATA_LEN];
        data[0] = 0x00; // periph qualifier, direct access block device
        data[1] = 0x80; // removable
        data[2] = 0x04; // SPC-2 compliance
        data[3] = 0x02; // response data format
        data[4] = (INQUIRY_DATA_LEN - 5) as u8; // additional length
        data[8..16].copy_from_slice(&self.vendor_id);
        data[16..32].copy_from_slice(&self.product_id);
        data[32..36].copy_from_slice(&self.product_rev);
        data
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new("USBD", "Flash Storage", "0.1")
    }
}

fn padded<const L: usize>(s: &str) -> [u8; L] {
    let mut field = [b' '; L];
    let len = s.len().min(L);
    field[..len].copy_from_slice(&s.as_bytes()[..len]);
    field
}
