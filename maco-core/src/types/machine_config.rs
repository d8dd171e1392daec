use alloc::collections::BTreeSet;
use alloc::string::String;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    Relay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub machine_id: String,
    pub label: String,
    pub required_permissions: BTreeSet<String>,
    pub control_kind: ControlKind,
}
