//! Session Coordinator (spec §4.4): combines NFC-layer state and Tag
//! Verifier results into a per-tag session.
//!
//! The source queues a `StartSession` action on the NFC worker
//! (`Begin -> AwaitStartSession -> AwaitAuthenticateNewSession ->
//! AwaitCompleteAuthentication -> {Succeeded,Rejected,Failed}`) and drives it
//! from `Application::Loop`. This Coordinator does the same: a cache hit
//! (`TagVerifier::begin_tag_arrival` returning `true`) resolves inline, and
//! a cache miss queues [`crate::session::start_session::StartSessionAction`]
//! on the reader's action queue instead of awaiting the cloud round trip
//! here. That queueing is what makes `NfcReader::abort_action_queue` a real
//! cancellation path: a `TagDeparted` event arriving while the action is
//! still queued calls its `on_abort`, not a dangling future nobody polls
//! anymore. `tick` drains the action's outcome (written to a shared slot)
//! and folds it into both `TagVerifier` and `CoordinatorState`. What the
//! source calls the "session registry" is the Verifier's `AuthCache` - a
//! lookup by `TagUid` for a still-valid prior authorization is exactly what
//! the cache already provides, so no second registry exists here.

use crate::app_state::{TagVerifier, VerifierState};
use crate::clock::MonotonicClock;
use crate::error::MacoError;
use crate::firebase::{Forward, FirebaseClient};
use crate::nfc::{NfcEvent, NfcReader, Pn532Port};
use crate::session::start_session::{StartSessionAction, StartSessionOutcome, StartSessionSlot};
use crate::types::{TagUid, TokenSession};
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;
use embassy_time::{Duration, Instant};

pub const REJECTED_DISPLAY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    WaitingForTag,
    AuthenticatingTag { tag_uid: TagUid },
    SessionActive { tag_uid: TagUid, session: TokenSession },
    Rejected { message: String, rejected_at: Instant },
}

struct PendingStartSession {
    tag_uid: TagUid,
    slot: StartSessionSlot,
}

pub struct Coordinator<C: MonotonicClock> {
    state: CoordinatorState,
    clock: C,
    pending: Option<PendingStartSession>,
}

impl<C: MonotonicClock> Coordinator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: CoordinatorState::Idle,
            clock,
            pending: None,
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// Drives one NFC event through `verifier` and folds the outcome into
    /// coordinator state. Tag departure unconditionally returns to `Idle`
    /// regardless of the substate it interrupts, which is what causes
    /// `MachineUsage` (wired by the caller) to check out - see spec §4.5's
    /// event mapping.
    pub async fn on_nfc_event<P: Pn532Port, F: Forward + 'static, VC: MonotonicClock>(
        &mut self,
        event: NfcEvent,
        reader: &mut NfcReader<P>,
        client: &Rc<FirebaseClient<F>>,
        verifier: &mut TagVerifier<VC>,
        authorization_key_slot: u8,
    ) -> Result<(), MacoError> {
        match event {
            NfcEvent::TagArrived(tag_uid) => {
                self.state = CoordinatorState::AuthenticatingTag { tag_uid };
                if verifier.begin_tag_arrival(tag_uid) {
                    self.sync_from_verifier(tag_uid, verifier);
                } else {
                    let slot: StartSessionSlot = Rc::new(RefCell::new(None));
                    let action = StartSessionAction::new(
                        client.clone(),
                        tag_uid,
                        authorization_key_slot,
                        slot.clone(),
                    );
                    if reader.enqueue_action(Box::new(action)) {
                        self.pending = Some(PendingStartSession { tag_uid, slot });
                    } else {
                        log::warn!("coordinator: action queue full, rejecting tag {tag_uid:?}");
                        verifier.mark_unauthorized();
                        self.sync_from_verifier(tag_uid, verifier);
                    }
                }
            }
            NfcEvent::TagDeparted => {
                verifier.handle_tag_departed();
                self.pending = None;
                self.state = CoordinatorState::Idle;
            }
        }
        Ok(())
    }

    fn sync_from_verifier<VC: MonotonicClock>(
        &mut self,
        tag_uid: TagUid,
        verifier: &TagVerifier<VC>,
    ) {
        match verifier.state() {
            VerifierState::Authorized {
                tag_uid: verified_uid,
                user_id,
                user_label,
                auth_id,
                permissions,
                session_expiry_epoch_s,
            } if *verified_uid == tag_uid => {
                self.state = CoordinatorState::SessionActive {
                    tag_uid,
                    session: TokenSession {
                        session_id: auth_id.clone(),
                        token_id: tag_uid,
                        expiry_epoch_s: *session_expiry_epoch_s,
                        user_id: user_id.clone(),
                        user_label: user_label.clone(),
                        permissions: permissions.clone(),
                    },
                };
            }
            VerifierState::Unauthorized => {
                self.state = CoordinatorState::Rejected {
                    message: "tag not authorized".into(),
                    rejected_at: self.clock.now(),
                };
            }
            _ => {}
        }
    }

    /// Drains a resolved `StartSessionAction` outcome, if any, and folds it
    /// into `verifier`/`self.state`. A still-pending action (`slot` empty)
    /// is put back untouched. `Aborted` needs no state update here - the
    /// `TagDeparted` branch of `on_nfc_event` has already reset `state` to
    /// `Idle` by the time an abort can have happened.
    fn finalize_start_session<VC: MonotonicClock>(&mut self, verifier: &mut TagVerifier<VC>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let outcome = pending.slot.borrow_mut().take();
        match outcome {
            None => self.pending = Some(pending),
            Some(StartSessionOutcome::Authorized {
                user_id,
                user_label,
                auth_id,
                permissions,
                session_expiry_epoch_s,
            }) => {
                verifier.finish_cloud_authorization(
                    pending.tag_uid,
                    auth_id,
                    user_id,
                    user_label,
                    permissions,
                    session_expiry_epoch_s,
                    true,
                );
                self.sync_from_verifier(pending.tag_uid, verifier);
            }
            Some(StartSessionOutcome::Unauthorized) => {
                verifier.mark_unauthorized();
                self.sync_from_verifier(pending.tag_uid, verifier);
            }
            Some(StartSessionOutcome::Aborted(reason)) => {
                log::debug!("coordinator: start session aborted: {reason:?}");
            }
        }
    }

    /// Drains any resolved `StartSessionAction` and handles `Rejected`'s 5 s
    /// self-timeout back to `Idle`. Call once per NFC worker tick after
    /// `reader.tick()`.
    pub fn tick<VC: MonotonicClock>(&mut self, verifier: &mut TagVerifier<VC>) {
        self.finalize_start_session(verifier);
        if let CoordinatorState::Rejected { rejected_at, .. } = &self.state {
            if self.clock.now() - *rejected_at >= REJECTED_DISPLAY_TIMEOUT {
                self.state = CoordinatorState::Idle;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::TagVerifier;
    use crate::clock::test_support::FakeMonotonicClock;
    use crate::firebase::test_support::{MockFirebaseTransport, ScriptedResponse};
    use crate::firebase::types::{TerminalCheckinResponseWire, TERMINAL_CHECKIN_ENDPOINT};
    use crate::nfc::port::test_support::MockPn532Port;
    use crate::types::FirebaseId;
    use embassy_futures::block_on;

    fn uid() -> TagUid {
        TagUid::from_bytes([0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    }

    fn ok_existing_auth(user_label: &str, auth_id: &str) -> ScriptedResponse {
        let body = postcard::to_allocvec(&TerminalCheckinResponseWire::AuthorizedWithExistingAuth {
            user_id: FirebaseId::new("U1").unwrap(),
            user_label: user_label.into(),
            auth_id: FirebaseId::new(auth_id).unwrap(),
            permissions: alloc::collections::BTreeSet::new(),
            session_expiry_epoch_s: 10_000,
        })
        .unwrap();
        ScriptedResponse::ok(TERMINAL_CHECKIN_ENDPOINT, body)
    }

    fn rejected(message: &str) -> ScriptedResponse {
        let body = postcard::to_allocvec(&TerminalCheckinResponseWire::Rejected {
            message: message.into(),
        })
        .unwrap();
        ScriptedResponse::ok(TERMINAL_CHECKIN_ENDPOINT, body)
    }

    /// Drives `reader.tick()` + `coordinator.tick(verifier)` until the
    /// pending `StartSessionAction` resolves (the mock transport never
    /// actually suspends, so this settles within a handful of iterations;
    /// the generous bound just guards against a test hanging forever if it
    /// doesn't).
    fn drive_to_settled<P: Pn532Port, CC: MonotonicClock, VC: MonotonicClock>(
        coordinator: &mut Coordinator<CC>,
        reader: &mut NfcReader<P>,
        verifier: &mut TagVerifier<VC>,
    ) {
        for _ in 0..16 {
            block_on(reader.tick());
            coordinator.tick(verifier);
            if coordinator.pending.is_none() {
                return;
            }
        }
        panic!("start session action did not settle");
    }

    #[test]
    fn tag_arrival_with_existing_auth_yields_session_active() {
        let clock = FakeMonotonicClock::new();
        let mut coordinator = Coordinator::new(&clock);
        let mut verifier = TagVerifier::new(&clock);
        let transport = MockFirebaseTransport::new();
        transport.push(ok_existing_auth("Alice", "A1"));
        let client = Rc::new(FirebaseClient::new(transport));
        let mut port = MockPn532Port::new();
        port.push(crate::nfc::port::test_support::ScriptedCall::PresencePing(
            Ok(true),
        ));
        let mut reader = NfcReader::new(port);
        reader.force_authenticated_for_test(uid());

        block_on(coordinator.on_nfc_event(
            NfcEvent::TagArrived(uid()),
            &mut reader,
            &client,
            &mut verifier,
            2,
        ))
        .unwrap();
        drive_to_settled(&mut coordinator, &mut reader, &mut verifier);

        match coordinator.state() {
            CoordinatorState::SessionActive { tag_uid, session } => {
                assert_eq!(*tag_uid, uid());
                assert_eq!(session.user_label, "Alice");
                assert_eq!(session.session_id.as_str(), "A1");
                assert_eq!(session.expiry_epoch_s, 10_000);
            }
            other => panic!("expected SessionActive, got {other:?}"),
        }
    }

    #[test]
    fn tag_departure_returns_to_idle_from_any_substate() {
        let clock = FakeMonotonicClock::new();
        let mut coordinator = Coordinator::new(&clock);
        let mut verifier = TagVerifier::new(&clock);
        let transport = MockFirebaseTransport::new();
        transport.push(ok_existing_auth("Alice", "A1"));
        let client = Rc::new(FirebaseClient::new(transport));
        let mut port = MockPn532Port::new();
        port.push(crate::nfc::port::test_support::ScriptedCall::PresencePing(
            Ok(true),
        ));
        let mut reader = NfcReader::new(port);
        reader.force_authenticated_for_test(uid());

        block_on(coordinator.on_nfc_event(
            NfcEvent::TagArrived(uid()),
            &mut reader,
            &client,
            &mut verifier,
            2,
        ))
        .unwrap();
        drive_to_settled(&mut coordinator, &mut reader, &mut verifier);
        assert!(matches!(
            coordinator.state(),
            CoordinatorState::SessionActive { .. }
        ));

        block_on(coordinator.on_nfc_event(
            NfcEvent::TagDeparted,
            &mut reader,
            &client,
            &mut verifier,
            2,
        ))
        .unwrap();
        assert_eq!(*coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn cloud_rejection_yields_rejected_then_self_times_out() {
        let clock = FakeMonotonicClock::new();
        let mut coordinator = Coordinator::new(&clock);
        let mut verifier = TagVerifier::new(&clock);
        let transport = MockFirebaseTransport::new();
        transport.push(rejected("revoked"));
        let client = Rc::new(FirebaseClient::new(transport));
        let mut port = MockPn532Port::new();
        port.push(crate::nfc::port::test_support::ScriptedCall::PresencePing(
            Ok(true),
        ));
        let mut reader = NfcReader::new(port);
        reader.force_authenticated_for_test(uid());

        block_on(coordinator.on_nfc_event(
            NfcEvent::TagArrived(uid()),
            &mut reader,
            &client,
            &mut verifier,
            2,
        ))
        .unwrap();
        drive_to_settled(&mut coordinator, &mut reader, &mut verifier);
        assert!(matches!(
            coordinator.state(),
            CoordinatorState::Rejected { .. }
        ));

        clock.advance(REJECTED_DISPLAY_TIMEOUT - Duration::from_millis(1));
        coordinator.tick(&mut verifier);
        assert!(matches!(
            coordinator.state(),
            CoordinatorState::Rejected { .. }
        ));

        clock.advance(Duration::from_millis(2));
        coordinator.tick(&mut verifier);
        assert_eq!(*coordinator.state(), CoordinatorState::Idle);
    }

    /// Testable property: a tag leaving mid-flight aborts the queued cloud
    /// flow instead of letting it run to completion underneath an absent
    /// tag. `presence_ping` reporting the tag gone on the very first tick
    /// means `StartSessionAction::step` never gets to poll its
    /// `terminal_checkin` future at all - `abort_action_queue` pops it and
    /// calls `on_abort` directly.
    #[test]
    fn tag_departure_mid_flight_aborts_queued_start_session() {
        let clock = FakeMonotonicClock::new();
        let mut coordinator = Coordinator::new(&clock);
        let mut verifier = TagVerifier::new(&clock);
        let transport = MockFirebaseTransport::new();
        transport.push(ok_existing_auth("Alice", "A1"));
        let client = Rc::new(FirebaseClient::new(transport));
        let mut port = MockPn532Port::new();
        port.push(crate::nfc::port::test_support::ScriptedCall::PresencePing(
            Ok(false),
        ));
        let mut reader = NfcReader::new(port);
        reader.force_authenticated_for_test(uid());

        block_on(coordinator.on_nfc_event(
            NfcEvent::TagArrived(uid()),
            &mut reader,
            &client,
            &mut verifier,
            2,
        ))
        .unwrap();
        assert!(coordinator.pending.is_some());

        let event = block_on(reader.tick());
        assert_eq!(event, Some(NfcEvent::TagDeparted));
        block_on(coordinator.on_nfc_event(
            NfcEvent::TagDeparted,
            &mut reader,
            &client,
            &mut verifier,
            2,
        ))
        .unwrap();
        coordinator.tick(&mut verifier);

        assert_eq!(*coordinator.state(), CoordinatorState::Idle);
        assert!(coordinator.pending.is_none());
        assert_eq!(client.transport().call_count("/api/terminalCheckin"), 0);
    }
}
