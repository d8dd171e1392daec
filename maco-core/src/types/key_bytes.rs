use crate::error::MacoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-128 key material, exactly 16 bytes. Constructed only via a
/// length-checked constructor. Never logged, never serialized to anywhere
/// except provisioned storage. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyBytes([u8; 16]);

impl KeyBytes {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, MacoError> {
        if slice.len() != 16 {
            return Err(MacoError::MalformedResponse);
        }
        let mut buf = [0u8; 16];
        buf.copy_from_slice(slice);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// Deliberately no Debug impl: key material must never be logged.
