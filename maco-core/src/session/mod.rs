//! Coordinator, Machine Usage, and Usage-History Store (spec §4.4-§4.6):
//! everything above the NFC/cloud authorization layer that turns an
//! authorized tag into a running machine and a durable usage log.

pub mod coordinator;
pub mod history_store;
pub mod machine_usage;
pub mod start_session;
pub mod terminal;

pub use coordinator::{Coordinator, CoordinatorState};
pub use machine_usage::{MachineUsage, RelayGpio, UsageState};
pub use start_session::{StartSessionAction, StartSessionOutcome, StartSessionSlot};
pub use terminal::Terminal;
