#![cfg_attr(not(test), no_std)]
// host builds (tests, maco-sim) compile against std; the embedded target
// builds no_std and supplies its own allocator + embassy-time driver.

extern crate alloc;

pub mod app_state;
pub mod clock;
pub mod config;
pub mod error;
pub mod firebase;
pub mod nfc;
pub mod observer;
pub mod secrets;
pub mod session;
pub mod types;

pub use error::MacoError;
