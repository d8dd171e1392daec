//! Wire-level request/response shapes for the four Firebase endpoints
//! (spec §4.7 table). These are the length-delimited binary messages the
//! `forward(endpoint, bytes)` transport carries; `client.rs` converts them
//! to/from the typed outcomes the rest of the core consumes.

use crate::types::FirebaseId;
use alloc::collections::BTreeSet;
use alloc::string::String;
use serde::{Deserialize, Serialize};

pub const TERMINAL_CHECKIN_ENDPOINT: &str = "/api/terminalCheckin";
pub const AUTHENTICATE_TAG_ENDPOINT: &str = "/api/authenticateTag";
pub const COMPLETE_TAG_AUTH_ENDPOINT: &str = "/api/completeTagAuth";
pub const PERSONALIZE_ENDPOINT: &str = "/api/personalize";
pub const UPLOAD_USAGE_ENDPOINT: &str = "/api/uploadUsage";

#[derive(Debug, Serialize, Deserialize)]
pub struct TerminalCheckinRequestWire {
    pub tag_uid: [u8; 7],
}

#[derive(Debug, Serialize, Deserialize)]
pub enum TerminalCheckinResponseWire {
    Rejected {
        message: String,
    },
    AuthorizedWithExistingAuth {
        user_id: FirebaseId,
        user_label: String,
        auth_id: FirebaseId,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    },
    AuthorizedNoAuth {
        user_id: FirebaseId,
        user_label: String,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticateTagRequestWire {
    pub tag_uid: [u8; 7],
    pub key_slot: u8,
    pub encrypted_rnd_b: [u8; 16],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthenticateTagResponseWire {
    pub auth_id: FirebaseId,
    pub cloud_challenge: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteTagAuthRequestWire {
    pub auth_id: FirebaseId,
    pub encrypted_part3: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize)]
pub enum CompleteTagAuthResponseWire {
    Rejected {
        message: String,
    },
    SessionKeys {
        ses_enc_key: [u8; 16],
        ses_mac_key: [u8; 16],
        ti: [u8; 4],
        picc_capabilities: [u8; 6],
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersonalizeRequestWire {
    pub tag_uid: [u8; 7],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersonalizeResponseWire {
    pub application: [u8; 16],
    pub authorization: [u8; 16],
    pub sdm_mac: [u8; 16],
    pub reserved2: [u8; 16],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadUsageRequestWire {
    pub history: crate::types::UsageHistory,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadUsageResponseWire;
