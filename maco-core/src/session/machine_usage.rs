//! Machine Usage (spec §4.5): drives the physical relay from Coordinator
//! state, enforces permission gating, the 8 h absolute timeout, and durable
//! `UsageRecord` bookkeeping through the history store.

use crate::clock::{MonotonicClock, WallClock};
use crate::error::MacoError;
use crate::session::history_store::{self, FileSystem};
use crate::types::{CheckoutReason, MachineConfig, TokenSession, UsageHistory, UsageRecord};
use alloc::string::String;
use embassy_time::{Duration, Instant};

pub const ACTIVE_TIMEOUT: Duration = Duration::from_secs(8 * 3600);
pub const DENIED_DISPLAY_TIMEOUT: Duration = Duration::from_secs(5);
pub const RELAY_PULSE_SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageState {
    Idle,
    Active {
        session: TokenSession,
        start_time: Instant,
    },
    Denied {
        message: String,
        started_at: Instant,
    },
}

/// The latching relay boundary. Reconfiguring direction and reading the
/// line back is how the component detects whether a pulse actually took
/// (spec §4.5's relay discipline) - there is no embedded-hal dependency in
/// this workspace, so this mirrors `nfc::Pn532Port`'s custom-trait-at-the-
/// hardware-seam shape rather than reaching for one.
pub trait RelayGpio {
    async fn configure_output(&mut self);
    async fn write(&mut self, energized: bool);
    async fn configure_input(&mut self);
    async fn read(&mut self) -> bool;
}

/// Owns exactly one machine's relay, history file, and check-in/check-out
/// state. One instance per configured machine.
pub struct MachineUsage<G: RelayGpio, W: WallClock, C: MonotonicClock, F: FileSystem> {
    state: UsageState,
    relay: G,
    wall_clock: W,
    clock: C,
    fs: F,
    machine: MachineConfig,
    history: UsageHistory,
    /// Set on check-out, cleared only once the caller confirms the upload
    /// landed - the source clears optimistically before the round trip
    /// completes; this resolves that open question on the safer side while
    /// keeping `on_upload_succeeded`/`on_upload_failed` as an explicit test
    /// seam (spec §9 open questions).
    pending_upload: bool,
}

impl<G: RelayGpio, W: WallClock, C: MonotonicClock, F: FileSystem> MachineUsage<G, W, C, F> {
    pub fn new(
        relay: G,
        wall_clock: W,
        clock: C,
        fs: F,
        machine: MachineConfig,
        history: UsageHistory,
    ) -> Self {
        Self {
            state: UsageState::Idle,
            relay,
            wall_clock,
            clock,
            fs,
            machine,
            history,
            pending_upload: false,
        }
    }

    pub fn state(&self) -> &UsageState {
        &self.state
    }

    pub fn history(&self) -> &UsageHistory {
        &self.history
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }

    pub fn pending_upload(&self) -> bool {
        self.pending_upload
    }

    /// Permission denial is a successful business outcome, not an error -
    /// only a state violation (already Active/Denied) is.
    pub fn check_in(&mut self, session: TokenSession) -> Result<(), MacoError> {
        if self.state != UsageState::Idle {
            return Err(MacoError::WrongState);
        }

        let missing = session.missing_permissions(self.machine.required_permissions.iter());
        if !missing.is_empty() {
            log::info!(
                "machine usage: denying check-in for {}, missing permissions {missing:?}",
                self.machine.machine_id
            );
            self.state = UsageState::Denied {
                message: "Keine Berechtigung".into(),
                started_at: self.clock.now(),
            };
            return Ok(());
        }

        let check_in_epoch_s = self.wall_clock.now_epoch_s();
        self.history
            .records
            .push(UsageRecord::open(session.session_id.clone(), check_in_epoch_s));
        if let Err(e) = history_store::persist(&mut self.fs, &self.history) {
            log::warn!("machine usage: failed to persist check-in: {e:?}");
        }
        self.state = UsageState::Active {
            session,
            start_time: self.clock.now(),
        };
        Ok(())
    }

    pub fn check_out(&mut self, reason: CheckoutReason) -> Result<(), MacoError> {
        let session_id = match &self.state {
            UsageState::Active { session, .. } => session.session_id.clone(),
            _ => return Err(MacoError::WrongState),
        };

        let check_out_epoch_s = self.wall_clock.now_epoch_s();
        match self.history.tail_mut() {
            Some(tail) if tail.is_open() && tail.session_id == session_id => {
                tail.close(check_out_epoch_s, reason);
            }
            Some(_) => {
                return Err(MacoError::UnexpectedState {
                    message: "history tail does not match the active session at check-out".into(),
                })
            }
            None => {
                return Err(MacoError::UnexpectedState {
                    message: "no history tail record at check-out".into(),
                })
            }
        }

        if let Err(e) = history_store::persist(&mut self.fs, &self.history) {
            log::warn!("machine usage: failed to persist check-out: {e:?}");
        }
        self.pending_upload = true;
        self.state = UsageState::Idle;
        Ok(())
    }

    /// Called once the caller's upload attempt for the current history
    /// snapshot has been acknowledged by the cloud; clears closed records
    /// and re-persists the (now-empty) history.
    pub fn on_upload_succeeded(&mut self) {
        if !self.pending_upload {
            return;
        }
        self.history.records.retain(|r| r.is_open());
        if let Err(e) = history_store::persist(&mut self.fs, &self.history) {
            log::warn!("machine usage: failed to persist post-upload history clear: {e:?}");
        }
        self.pending_upload = false;
    }

    /// Leaves local records in place for a retry; `pending_upload` stays
    /// set so the caller knows to try again.
    pub fn on_upload_failed(&mut self) {
        log::warn!("machine usage: usage upload failed, retaining local records for retry");
    }

    /// Absolute 8 h timeout on `Active`; 5 s display timeout on `Denied`.
    pub fn tick(&mut self) {
        match &self.state {
            UsageState::Active { start_time, .. } => {
                if self.clock.now() - *start_time > ACTIVE_TIMEOUT {
                    log::info!(
                        "machine usage: {} hit the absolute session timeout, forcing check-out",
                        self.machine.machine_id
                    );
                    let _ = self.check_out(CheckoutReason::Timeout);
                }
            }
            UsageState::Denied { started_at, .. } => {
                if self.clock.now() - *started_at >= DENIED_DISPLAY_TIMEOUT {
                    self.state = UsageState::Idle;
                }
            }
            UsageState::Idle => {}
        }
    }

    fn desired_relay_energized(&self) -> bool {
        matches!(self.state, UsageState::Active { .. })
    }

    /// The desired relay state is a pure function of `state`; this compares
    /// it against the read-back line and only drives a pulse when they
    /// disagree.
    pub async fn sync_relay(&mut self) {
        let desired = self.desired_relay_energized();
        let actual = self.relay.read().await;
        if actual == desired {
            return;
        }
        self.relay.configure_output().await;
        self.relay.write(desired).await;
        embassy_time::Timer::after(RELAY_PULSE_SETTLE).await;
        self.relay.configure_input().await;
        let confirmed = self.relay.read().await;
        if confirmed != desired {
            log::error!(
                "machine usage: {} relay read-back disagreed after pulse, desired={desired} actual={confirmed}",
                self.machine.machine_id
            );
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MockRelayGpio;
    use super::*;
    use crate::clock::test_support::{FakeMonotonicClock, FakeWallClock};
    use crate::session::history_store::test_support::InMemoryFileSystem;
    use crate::types::{ControlKind, FirebaseId};
    use alloc::collections::BTreeSet;
    use embassy_futures::block_on;

    fn machine(required: &[&str]) -> MachineConfig {
        MachineConfig {
            machine_id: "saw-1".into(),
            label: "Table Saw".into(),
            required_permissions: required.iter().map(|s| (*s).into()).collect(),
            control_kind: ControlKind::Relay,
        }
    }

    fn session(permissions: &[&str]) -> TokenSession {
        TokenSession {
            session_id: FirebaseId::new("S1").unwrap(),
            token_id: crate::types::TagUid::from_bytes([0, 0, 0, 0, 0, 0, 1]),
            expiry_epoch_s: 999_999,
            user_id: FirebaseId::new("U1").unwrap(),
            user_label: "Alice".into(),
            permissions: permissions.iter().map(|s| (*s).into()).collect(),
        }
    }

    fn fixture(
        required: &[&str],
    ) -> MachineUsage<MockRelayGpio, FakeWallClock, FakeMonotonicClock, InMemoryFileSystem> {
        MachineUsage::new(
            MockRelayGpio::new(),
            FakeWallClock::new(1_000_000),
            FakeMonotonicClock::new(),
            InMemoryFileSystem::new(),
            machine(required),
            UsageHistory::new("saw-1".into()),
        )
    }

    #[test]
    fn permission_denial_is_ok_and_leaves_no_history_record() {
        let mut usage = fixture(&["A", "B"]);
        usage.check_in(session(&["A"])).unwrap();
        match usage.state() {
            UsageState::Denied { message, .. } => assert_eq!(message, "Keine Berechtigung"),
            other => panic!("expected Denied, got {other:?}"),
        }
        assert!(usage.history().records.is_empty());
    }

    #[test]
    fn denied_state_self_times_out_after_five_seconds() {
        let mut usage = fixture(&["A", "B"]);
        usage.check_in(session(&["A"])).unwrap();
        assert!(matches!(usage.state(), UsageState::Denied { .. }));
        usage.tick();
        assert!(matches!(usage.state(), UsageState::Denied { .. }));

        for _ in 0..5 {
            usage.clock.advance(Duration::from_secs(1));
        }
        usage.tick();
        assert_eq!(*usage.state(), UsageState::Idle);
    }

    #[test]
    fn happy_path_check_in_then_check_out() {
        let mut usage = fixture(&["A"]);
        usage.check_in(session(&["A", "B"])).unwrap();
        assert!(matches!(usage.state(), UsageState::Active { .. }));
        assert_eq!(usage.history().records.len(), 1);
        assert!(usage.history().records[0].is_open());

        usage.check_out(CheckoutReason::Ui).unwrap();
        assert_eq!(*usage.state(), UsageState::Idle);
        assert!(!usage.history().records[0].is_open());
        assert_eq!(usage.history().records[0].check_out_epoch_s, 1_000_000);
        assert!(usage.pending_upload());
    }

    #[test]
    fn check_out_without_active_session_is_wrong_state() {
        let mut usage = fixture(&[]);
        assert!(matches!(
            usage.check_out(CheckoutReason::Ui).unwrap_err(),
            MacoError::WrongState
        ));
    }

    #[test]
    fn check_in_while_active_is_wrong_state() {
        let mut usage = fixture(&[]);
        usage.check_in(session(&[])).unwrap();
        assert!(matches!(
            usage.check_in(session(&[])).unwrap_err(),
            MacoError::WrongState
        ));
    }

    #[test]
    fn crash_recovery_preserves_open_tail_record() {
        let mut usage = fixture(&[]);
        usage.check_in(session(&[])).unwrap();

        let reloaded = history_store::load(&usage.fs, "saw-1").unwrap();
        assert_eq!(reloaded.records.len(), 1);
        assert!(reloaded.records[0].is_open());
        assert_eq!(reloaded.records[0].session_id.as_str(), "S1");

        usage.check_out(CheckoutReason::Ui).unwrap();
        assert!(!usage.history().records[0].is_open());
        assert_eq!(
            usage.history().records[0].reason,
            Some(CheckoutReason::Ui)
        );
    }

    #[test]
    fn absolute_timeout_forces_checkout_with_timeout_reason() {
        let mut usage = fixture(&[]);
        usage.check_in(session(&[])).unwrap();

        usage
            .clock
            .advance(ACTIVE_TIMEOUT + Duration::from_secs(1));
        usage.wall_clock.advance(8 * 3600 + 1);
        usage.tick();

        assert_eq!(*usage.state(), UsageState::Idle);
        assert_eq!(
            usage.history().records[0].reason,
            Some(CheckoutReason::Timeout)
        );
        assert_eq!(usage.history().records[0].check_out_epoch_s, 1_000_000 + 8 * 3600 + 1);
        assert!(usage.pending_upload());
    }

    #[test]
    fn upload_success_clears_closed_records_only_on_acknowledgement() {
        let mut usage = fixture(&[]);
        usage.check_in(session(&[])).unwrap();
        usage.check_out(CheckoutReason::Ui).unwrap();
        assert!(usage.pending_upload());
        assert_eq!(usage.history().records.len(), 1);

        usage.on_upload_succeeded();
        assert!(!usage.pending_upload());
        assert!(usage.history().records.is_empty());
    }

    #[test]
    fn upload_failure_keeps_records_pending_retry() {
        let mut usage = fixture(&[]);
        usage.check_in(session(&[])).unwrap();
        usage.check_out(CheckoutReason::Ui).unwrap();

        usage.on_upload_failed();
        assert!(usage.pending_upload());
        assert_eq!(usage.history().records.len(), 1);
    }

    #[test]
    fn relay_sync_pulses_only_on_disagreement() {
        let mut usage = fixture(&[]);
        block_on(usage.sync_relay());
        assert!(!usage.relay.energized);

        usage.check_in(session(&[])).unwrap();
        block_on(usage.sync_relay());
        assert!(usage.relay.energized);
        assert!(!usage.relay.is_output);
    }
}
