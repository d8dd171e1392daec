use heapless::Vec as HVec;

/// Runtime NFC target, owned exclusively by the NFC reader. Higher layers
/// never see this directly; it is exposed behind the reader's transceive
/// capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTag {
    /// Anti-collision UID, 3-10 bytes. MUST NOT be used as identity.
    anti_collision_uid: HVec<u8, 10>,
    pub sak: u8,
    pub target_number: u8,
    pub supports_iso14443_4: bool,
}

impl AppTag {
    pub fn new(
        anti_collision_uid: &[u8],
        sak: u8,
        target_number: u8,
        supports_iso14443_4: bool,
    ) -> Option<Self> {
        if !(3..=10).contains(&anti_collision_uid.len()) {
            return None;
        }
        let mut buf = HVec::new();
        buf.extend_from_slice(anti_collision_uid).ok()?;
        Some(Self {
            anti_collision_uid: buf,
            sak,
            target_number,
            supports_iso14443_4,
        })
    }

    pub fn anti_collision_uid(&self) -> &[u8] {
        &self.anti_collision_uid
    }
}
