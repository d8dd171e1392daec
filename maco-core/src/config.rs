//! Terminal-wide configuration, read once at boot from a cloud-synced
//! ledger (spec §6). No hot-reload: a configuration change is observed only
//! at construction time; the device reboots to pick up a new one.

use crate::types::MachineConfig;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub hardware_revision: String,
    pub gateway_host: String,
    pub gateway_port: u16,
    pub machines: Vec<MachineConfig>,
}

impl DeviceConfig {
    /// Decodes the ledger blob the (out-of-scope) configuration-store
    /// transport hands the core. The ledger/config-store transport itself
    /// is not specified here, same as Firebase's transport - only the shape
    /// the core consumes is.
    pub fn from_ledger_bytes(bytes: &[u8]) -> Result<Self, crate::error::MacoError> {
        postcard::from_bytes(bytes).map_err(|_| crate::error::MacoError::MalformedResponse)
    }

    pub fn machine(&self, machine_id: &str) -> Option<&MachineConfig> {
        self.machines.iter().find(|m| m.machine_id == machine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ControlKind;
    use alloc::collections::BTreeSet;

    #[test]
    fn round_trips_through_ledger_bytes() {
        let config = DeviceConfig {
            hardware_revision: "rev-b".into(),
            gateway_host: "gateway.example".into(),
            gateway_port: 8443,
            machines: alloc::vec![MachineConfig {
                machine_id: "saw-1".into(),
                label: "Table Saw".into(),
                required_permissions: BTreeSet::from(["woodshop".into()]),
                control_kind: ControlKind::Relay,
            }],
        };
        let bytes = postcard::to_allocvec(&config).unwrap();
        let decoded = DeviceConfig::from_ledger_bytes(&bytes).unwrap();
        assert_eq!(decoded, config);
        assert!(decoded.machine("saw-1").is_some());
    }
}
