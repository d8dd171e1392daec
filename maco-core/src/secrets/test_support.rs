use super::device_secrets::{Flash, FlashError, SECTOR_LEN};
use alloc::vec;
use alloc::vec::Vec;

/// A single 4 KiB sector backed by a `Vec<u8>`, initialized erased (`0xFF`,
/// matching real NOR flash erase state).
pub struct InMemoryFlash {
    sector: Vec<u8>,
}

impl InMemoryFlash {
    pub fn new() -> Self {
        Self {
            sector: vec![0xFFu8; SECTOR_LEN],
        }
    }
}

impl Default for InMemoryFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl Flash for InMemoryFlash {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        if offset + buf.len() > self.sector.len() {
            return Err(FlashError);
        }
        buf.copy_from_slice(&self.sector[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), FlashError> {
        if offset + data.len() > self.sector.len() {
            return Err(FlashError);
        }
        self.sector[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase_sector(&mut self) -> Result<(), FlashError> {
        self.sector.fill(0xFF);
        Ok(())
    }
}
