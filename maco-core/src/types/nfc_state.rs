use super::{AppTag, TagUid};

/// Tag-presence state machine owned by the NFC reader. Only
/// `Ntag424Authenticated` exposes a real UID; transitions are monotone in a
/// single direction per tag encounter except `TagError -> WaitingForTag`
/// (recovery) and reset on tag departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcState {
    WaitingForTag,
    TagPresent { tag: AppTag },
    UnsupportedTag { tag: AppTag },
    Ntag424Unauthenticated { tag: AppTag, anti_collision_uid: heapless::Vec<u8, 10> },
    Ntag424Authenticated { tag: AppTag, real_uid: TagUid },
    TagError { tag: AppTag, retry_count: u8 },
}

impl NfcState {
    pub fn tag(&self) -> Option<&AppTag> {
        match self {
            NfcState::WaitingForTag => None,
            NfcState::TagPresent { tag }
            | NfcState::UnsupportedTag { tag }
            | NfcState::Ntag424Unauthenticated { tag, .. }
            | NfcState::Ntag424Authenticated { tag, .. }
            | NfcState::TagError { tag, .. } => Some(tag),
        }
    }

    pub fn real_uid(&self) -> Option<&TagUid> {
        match self {
            NfcState::Ntag424Authenticated { real_uid, .. } => Some(real_uid),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, NfcState::Ntag424Authenticated { .. })
    }
}
