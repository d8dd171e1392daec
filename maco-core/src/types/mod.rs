mod app_tag;
mod device_id;
mod firebase_id;
mod key_bytes;
mod machine_config;
mod nfc_state;
mod secure_session;
mod tag_uid;
mod token_session;
mod usage;

pub use app_tag::AppTag;
pub use device_id::DeviceId;
pub use firebase_id::FirebaseId;
pub use key_bytes::KeyBytes;
pub use machine_config::{ControlKind, MachineConfig};
pub use nfc_state::NfcState;
pub use secure_session::SecureSession;
pub use tag_uid::TagUid;
pub use token_session::TokenSession;
pub use usage::{CheckoutReason, UsageHistory, UsageRecord};
