use super::FirebaseId;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutReason {
    Ui,
    CheckinOtherTag,
    CheckinOtherMachine,
    Timeout,
    SelfCheckout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub session_id: FirebaseId,
    pub check_in_epoch_s: i64,
    /// 0 means still open.
    pub check_out_epoch_s: i64,
    pub reason: Option<CheckoutReason>,
}

impl UsageRecord {
    pub fn open(session_id: FirebaseId, check_in_epoch_s: i64) -> Self {
        Self {
            session_id,
            check_in_epoch_s,
            check_out_epoch_s: 0,
            reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.check_out_epoch_s == 0
    }

    pub fn close(&mut self, check_out_epoch_s: i64, reason: CheckoutReason) {
        self.check_out_epoch_s = check_out_epoch_s;
        self.reason = Some(reason);
    }
}

/// Append-only in normal operation. The tail record may be open
/// (`check_out_epoch_s == 0`); at most one open record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageHistory {
    pub machine_id: String,
    pub records: Vec<UsageRecord>,
}

impl UsageHistory {
    pub fn new(machine_id: String) -> Self {
        Self {
            machine_id,
            records: Vec::new(),
        }
    }

    pub fn tail_mut(&mut self) -> Option<&mut UsageRecord> {
        self.records.last_mut()
    }

    pub fn tail(&self) -> Option<&UsageRecord> {
        self.records.last()
    }

    pub fn has_open_tail(&self) -> bool {
        self.tail().is_some_and(UsageRecord::is_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(s: &str) -> FirebaseId {
        FirebaseId::new(s).unwrap()
    }

    #[test]
    fn open_then_close_leaves_single_closed_tail() {
        let mut history = UsageHistory::new("m1".into());
        history.records.push(UsageRecord::open(fid("S1"), 1000));
        assert!(history.has_open_tail());
        history.tail_mut().unwrap().close(1100, CheckoutReason::Ui);
        assert!(!history.has_open_tail());
        assert_eq!(history.tail().unwrap().check_out_epoch_s, 1100);
    }
}
