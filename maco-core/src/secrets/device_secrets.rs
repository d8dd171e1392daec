//! Opaque accessor for the two provisioned 16-byte keys (spec §4.9). Storage
//! layout: `Magic(4B "MAC0") | Version(1B=1) | Length(2B LE) | Reserved(1B)
//! | payload(<=64B) | CRC32(4B)` in a single 4 KiB flash sector.

use crate::error::MacoError;
use crate::types::KeyBytes;
use crc::{Crc, CRC_32_ISO_HDLC};

pub const SECTOR_LEN: usize = 4096;
const MAGIC: [u8; 4] = *b"MAC0";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 2 + 1;
const PAYLOAD_LEN: usize = 32; // gateway_master_secret(16) || ntag_terminal_key(16)
const CRC_LEN: usize = 4;
const RECORD_LEN: usize = HEADER_LEN + PAYLOAD_LEN + CRC_LEN;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashError;

impl From<FlashError> for MacoError {
    fn from(_: FlashError) -> Self {
        MacoError::Unspecified {
            message: "flash I/O error".into(),
        }
    }
}

/// The raw byte-addressable sector the device secrets live in. A real
/// implementation wraps the platform's flash driver; `test_support`
/// supplies an in-memory fake.
pub trait Flash {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError>;
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), FlashError>;
    fn erase_sector(&mut self) -> Result<(), FlashError>;
}

fn build_record(gateway_master_secret: &KeyBytes, ntag_terminal_key: &KeyBytes) -> [u8; RECORD_LEN] {
    let mut record = [0u8; RECORD_LEN];
    record[0..4].copy_from_slice(&MAGIC);
    record[4] = VERSION;
    record[5..7].copy_from_slice(&(PAYLOAD_LEN as u16).to_le_bytes());
    record[7] = 0;
    record[8..24].copy_from_slice(gateway_master_secret.as_bytes());
    record[24..40].copy_from_slice(ntag_terminal_key.as_bytes());
    let crc = CRC32.checksum(&record[..HEADER_LEN + PAYLOAD_LEN]);
    record[HEADER_LEN + PAYLOAD_LEN..].copy_from_slice(&crc.to_le_bytes());
    record
}

fn parse_record(record: &[u8; RECORD_LEN]) -> Option<(KeyBytes, KeyBytes)> {
    if record[0..4] != MAGIC {
        return None;
    }
    if record[4] != VERSION {
        return None;
    }
    let length = u16::from_le_bytes([record[5], record[6]]) as usize;
    if length != PAYLOAD_LEN {
        return None;
    }
    let stored_crc = u32::from_le_bytes(record[HEADER_LEN + PAYLOAD_LEN..].try_into().ok()?);
    let computed_crc = CRC32.checksum(&record[..HEADER_LEN + PAYLOAD_LEN]);
    if stored_crc != computed_crc {
        return None;
    }
    let gateway_master_secret = KeyBytes::from_slice(&record[8..24]).ok()?;
    let ntag_terminal_key = KeyBytes::from_slice(&record[24..40]).ok()?;
    Some((gateway_master_secret, ntag_terminal_key))
}

/// Read path: read header -> validate magic/version/length -> read payload
/// -> read CRC -> recompute over `header || payload` -> decode -> cache keys
/// in zeroized memory. `is_provisioned()` is true iff a valid record was
/// read at construction time or after a successful `provision`.
pub struct DeviceSecrets<F: Flash> {
    flash: F,
    cached: Option<(KeyBytes, KeyBytes)>,
}

impl<F: Flash> DeviceSecrets<F> {
    pub fn load(flash: F) -> Result<Self, MacoError> {
        let mut record = [0u8; RECORD_LEN];
        flash.read(0, &mut record)?;
        let cached = parse_record(&record);
        Ok(Self { flash, cached })
    }

    pub fn is_provisioned(&self) -> bool {
        self.cached.is_some()
    }

    pub fn gateway_master_secret(&self) -> Result<KeyBytes, MacoError> {
        self.cached
            .as_ref()
            .map(|(gateway, _)| gateway.clone())
            .ok_or(MacoError::WrongState)
    }

    pub fn ntag_terminal_key(&self) -> Result<KeyBytes, MacoError> {
        self.cached
            .as_ref()
            .map(|(_, terminal)| terminal.clone())
            .ok_or(MacoError::WrongState)
    }

    /// Called only by the factory RPC (out of scope): erases the sector,
    /// writes the full record in one contiguous write, updates the cache.
    pub fn provision(
        &mut self,
        gateway_master_secret: KeyBytes,
        ntag_terminal_key: KeyBytes,
    ) -> Result<(), MacoError> {
        self.flash.erase_sector()?;
        let record = build_record(&gateway_master_secret, &ntag_terminal_key);
        self.flash.write(0, &record)?;
        self.cached = Some((gateway_master_secret, ntag_terminal_key));
        Ok(())
    }

    /// Erases the sector and invalidates the cache. The provisioning-wipe
    /// factory RPC that calls this is out of scope; this is the core-owned
    /// primitive it drives.
    pub fn clear_provisioning(&mut self) -> Result<(), MacoError> {
        self.flash.erase_sector()?;
        self.cached = None;
        Ok(())
    }
}
