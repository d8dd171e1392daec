use super::KeyBytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Established after successful mutual authentication. Valid only while the
/// originating `Ntag424Authenticated` NFC state holds; tag departure or any
/// protocol error invalidates it. Key material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureSession {
    pub ses_enc_key: KeyBytes,
    pub ses_mac_key: KeyBytes,
    pub transaction_id: [u8; 4],
    pub picc_capabilities: [u8; 6],
    pub command_counter: u16,
}

impl SecureSession {
    pub fn new(
        ses_enc_key: KeyBytes,
        ses_mac_key: KeyBytes,
        transaction_id: [u8; 4],
        picc_capabilities: [u8; 6],
    ) -> Self {
        Self {
            ses_enc_key,
            ses_mac_key,
            transaction_id,
            picc_capabilities,
            command_counter: 0,
        }
    }

    /// Increments `command_counter`. Returns `false` (and leaves the
    /// session unusable) if the counter had already reached `0xFFFF` -
    /// the session dies rather than wrapping around.
    #[must_use]
    pub fn increment_counter(&mut self) -> bool {
        if self.command_counter == 0xFFFF {
            return false;
        }
        self.command_counter += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_refuses_to_wrap() {
        let mut session = SecureSession::new(
            KeyBytes::from_bytes([0u8; 16]),
            KeyBytes::from_bytes([0u8; 16]),
            [0u8; 4],
            [0u8; 6],
        );
        session.command_counter = 0xFFFF;
        assert!(!session.increment_counter());
        assert_eq!(session.command_counter, 0xFFFF);
    }

    #[test]
    fn counter_increments_normally() {
        let mut session = SecureSession::new(
            KeyBytes::from_bytes([0u8; 16]),
            KeyBytes::from_bytes([0u8; 16]),
            [0u8; 4],
            [0u8; 6],
        );
        assert!(session.increment_counter());
        assert_eq!(session.command_counter, 1);
    }
}
