//! NTAG 424 DNA secure messaging (spec §4.2): AES primitives, the
//! command/response `CMAC` and padding layer, key-provider strategies, and
//! the APDU-level protocol built on the reader's transceive surface.

pub mod crypto;
pub mod key_provider;
pub mod protocol;
pub mod secure_messaging;

pub use key_provider::{CloudKeyProvider, KeyProvider, LocalKeyProvider, RandomSource};
pub use protocol::{
    authenticate, authenticate_cloud_key, authenticate_terminal_key, get_card_uid,
    select_application,
};
