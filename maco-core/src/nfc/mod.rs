//! NFC front-end: the PN532 port boundary, the tag-presence reader state
//! machine, the queued-action mechanism it exposes to higher layers, and the
//! NTAG 424 DNA secure-messaging stack built on top of it.

pub mod action;
pub mod ntag424;
pub mod port;
pub mod reader;

pub use action::{ActionStep, NfcAction};
pub use port::{Pn532Port, PortError};
pub use reader::{NfcEvent, NfcReader};
