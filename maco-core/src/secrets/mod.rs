//! Device Secrets (spec §4.9): opaque accessor for the two provisioned
//! 16-byte keys and the provisioning state.

pub mod device_secrets;

pub use device_secrets::{DeviceSecrets, Flash, FlashError};

#[cfg(test)]
pub mod test_support;
