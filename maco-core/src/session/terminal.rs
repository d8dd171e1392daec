//! Wires the pieces spec §4 describes as separate layers into the one loop
//! a real terminal runs: `NfcReader::tick()` drives the terminal-key
//! handshake and tag presence, `Coordinator::on_nfc_event` turns the
//! resulting `NfcEvent`s into session state (via `TagVerifier` and, for a
//! cache miss, a queued `StartSessionAction`), and `MachineUsage` turns
//! session state into a running or stopped machine. Nothing below this
//! module calls anything above it; this is the one place all three meet.

use crate::app_state::TagVerifier;
use crate::clock::{MonotonicClock, WallClock};
use crate::error::MacoError;
use crate::firebase::{FirebaseClient, Forward};
use crate::nfc::ntag424::{protocol, RandomSource};
use crate::nfc::{NfcEvent, NfcReader, Pn532Port};
use crate::session::coordinator::{Coordinator, CoordinatorState};
use crate::session::history_store::FileSystem;
use crate::session::machine_usage::{MachineUsage, RelayGpio, UsageState};
use crate::types::{CheckoutReason, KeyBytes, NfcState};
use alloc::rc::Rc;

/// One fully-wired terminal: NFC front-end, cloud session coordinator, and
/// the machine it gates. `C` is shared (by value, so it must be cheap to
/// copy - `EmbassyMonotonicClock` or a `&FakeMonotonicClock` in tests)
/// across the coordinator, verifier, and usage clocks, matching how the
/// source passes one `RtClock` reference to everything.
pub struct Terminal<P, F, C, G, W, FS, R>
where
    P: Pn532Port,
    F: Forward + 'static,
    C: MonotonicClock + Copy,
    G: RelayGpio,
    W: WallClock,
    FS: FileSystem,
    R: RandomSource + Clone,
{
    reader: NfcReader<P>,
    client: Rc<FirebaseClient<F>>,
    verifier: TagVerifier<C>,
    coordinator: Coordinator<C>,
    usage: MachineUsage<G, W, C, FS>,
    terminal_key: KeyBytes,
    rng: R,
    authorization_key_slot: u8,
}

impl<P, F, C, G, W, FS, R> Terminal<P, F, C, G, W, FS, R>
where
    P: Pn532Port,
    F: Forward + 'static,
    C: MonotonicClock + Copy,
    G: RelayGpio,
    W: WallClock,
    FS: FileSystem,
    R: RandomSource + Clone,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: NfcReader<P>,
        client: Rc<FirebaseClient<F>>,
        verifier: TagVerifier<C>,
        coordinator: Coordinator<C>,
        usage: MachineUsage<G, W, C, FS>,
        terminal_key: KeyBytes,
        rng: R,
        authorization_key_slot: u8,
    ) -> Self {
        Self {
            reader,
            client,
            verifier,
            coordinator,
            usage,
            terminal_key,
            rng,
            authorization_key_slot,
        }
    }

    pub fn coordinator_state(&self) -> &CoordinatorState {
        self.coordinator.state()
    }

    pub fn usage_state(&self) -> &UsageState {
        self.usage.state()
    }

    /// One iteration of the terminal's loop: drive the terminal-key
    /// handshake if a tag just showed up, drain the reader's tick (which
    /// may report `TagDeparted`), let the coordinator settle any pending
    /// cloud flow, and sync `MachineUsage` to whatever the coordinator
    /// landed on.
    pub async fn tick(&mut self) -> Result<(), MacoError> {
        if matches!(self.reader.current_tag(), NfcState::Ntag424Unauthenticated { .. })
        {
            match protocol::authenticate_terminal_key(
                &mut self.reader,
                self.terminal_key.clone(),
                self.rng.clone(),
            )
            .await
            {
                Ok(real_uid) => {
                    self.coordinator
                        .on_nfc_event(
                            NfcEvent::TagArrived(real_uid),
                            &mut self.reader,
                            &self.client,
                            &mut self.verifier,
                            self.authorization_key_slot,
                        )
                        .await?;
                }
                Err(e) => {
                    log::warn!("terminal: terminal-key handshake failed: {e:?}");
                }
            }
        }

        if let Some(event @ NfcEvent::TagDeparted) = self.reader.tick().await {
            self.coordinator
                .on_nfc_event(
                    event,
                    &mut self.reader,
                    &self.client,
                    &mut self.verifier,
                    self.authorization_key_slot,
                )
                .await?;
        }

        self.coordinator.tick(&mut self.verifier);
        self.sync_usage();
        self.usage.tick();
        self.usage.sync_relay().await;
        Ok(())
    }

    /// `MachineUsage` has no event feed of its own - whether it should be
    /// checked in or out is purely a function of comparing its state against
    /// the coordinator's, so there is no separate "checked in" flag to drift
    /// out of sync.
    fn sync_usage(&mut self) {
        let active_session = match self.coordinator.state() {
            CoordinatorState::SessionActive { session, .. } => Some(session.clone()),
            _ => None,
        };
        let usage_active = matches!(self.usage.state(), UsageState::Active { .. });

        match (active_session, usage_active) {
            (Some(session), false) => {
                if let Err(e) = self.usage.check_in(session) {
                    log::warn!("terminal: check-in failed: {e:?}");
                }
            }
            (None, true) => {
                if let Err(e) = self.usage.check_out(CheckoutReason::SelfCheckout) {
                    log::warn!("terminal: check-out failed: {e:?}");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::TagVerifier;
    use crate::clock::test_support::{FakeMonotonicClock, FakeWallClock};
    use crate::firebase::test_support::{MockFirebaseTransport, ScriptedResponse};
    use crate::firebase::types::{TerminalCheckinResponseWire, TERMINAL_CHECKIN_ENDPOINT};
    use crate::nfc::port::test_support::{MockPn532Port, ScriptedCall};
    use crate::session::history_store::test_support::InMemoryFileSystem;
    use crate::session::machine_usage::test_support::MockRelayGpio;
    use crate::types::{ControlKind, FirebaseId, MachineConfig, TagUid, UsageHistory};
    use alloc::boxed::Box;
    use alloc::collections::BTreeSet;
    use embassy_futures::block_on;

    #[derive(Clone)]
    struct NullRandomSource;
    impl RandomSource for NullRandomSource {
        fn fill(&mut self, buf: &mut [u8]) {
            buf.fill(0);
        }
    }

    fn uid() -> TagUid {
        TagUid::from_bytes([0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    }

    fn ok_existing_auth(user_label: &str, auth_id: &str) -> ScriptedResponse {
        let body = postcard::to_allocvec(&TerminalCheckinResponseWire::AuthorizedWithExistingAuth {
            user_id: FirebaseId::new("U1").unwrap(),
            user_label: user_label.into(),
            auth_id: FirebaseId::new(auth_id).unwrap(),
            permissions: BTreeSet::new(),
            session_expiry_epoch_s: 10_000,
        })
        .unwrap();
        ScriptedResponse::ok(TERMINAL_CHECKIN_ENDPOINT, body)
    }

    fn build_terminal(
        port: MockPn532Port,
        transport: MockFirebaseTransport,
    ) -> Terminal<
        MockPn532Port,
        MockFirebaseTransport,
        &'static FakeMonotonicClock,
        MockRelayGpio,
        FakeWallClock,
        InMemoryFileSystem,
        NullRandomSource,
    > {
        let clock: &'static FakeMonotonicClock = Box::leak(Box::new(FakeMonotonicClock::new()));
        let reader = NfcReader::new(port);
        let client = Rc::new(FirebaseClient::new(transport));
        let verifier = TagVerifier::new(clock);
        let coordinator = Coordinator::new(clock);
        let machine = MachineConfig {
            machine_id: "m1".into(),
            label: "Laser".into(),
            required_permissions: BTreeSet::new(),
            control_kind: ControlKind::Relay,
        };
        let usage = MachineUsage::new(
            MockRelayGpio::new(),
            FakeWallClock::new(1_000_000),
            clock,
            InMemoryFileSystem::new(),
            machine,
            UsageHistory::new("m1".into()),
        );
        Terminal::new(
            reader,
            client,
            verifier,
            coordinator,
            usage,
            KeyBytes::from_bytes([0u8; 16]),
            NullRandomSource,
            2,
        )
    }

    /// A cache-miss `TagArrived` fed straight to the coordinator (standing
    /// in for a terminal-key handshake that already succeeded - that
    /// handshake's own crypto is covered at the protocol layer) settles
    /// through the queued `StartSessionAction` and checks the machine in via
    /// `Terminal::tick`, then a scripted departure checks it back out -
    /// exercising the full `NfcReader` -> `Coordinator` -> `MachineUsage`
    /// pipeline for real instead of through hand-built fixtures.
    #[test]
    fn tick_drains_settled_session_into_machine_usage_and_back_out() {
        let transport = MockFirebaseTransport::new();
        transport.push(ok_existing_auth("Alice", "A1"));
        let mut port = MockPn532Port::new();
        port.push(ScriptedCall::PresencePing(Ok(true)));
        port.push(ScriptedCall::PresencePing(Ok(false)));
        let mut terminal = build_terminal(port, transport);
        terminal.reader.force_authenticated_for_test(uid());

        block_on(terminal.coordinator.on_nfc_event(
            NfcEvent::TagArrived(uid()),
            &mut terminal.reader,
            &terminal.client,
            &mut terminal.verifier,
            terminal.authorization_key_slot,
        ))
        .unwrap();
        assert!(matches!(
            terminal.coordinator_state(),
            CoordinatorState::AuthenticatingTag { .. }
        ));

        block_on(terminal.tick()).unwrap();
        match terminal.usage_state() {
            UsageState::Active { session, .. } => assert_eq!(session.user_label, "Alice"),
            other => panic!("expected Active, got {other:?}"),
        }
        assert!(matches!(
            terminal.coordinator_state(),
            CoordinatorState::SessionActive { .. }
        ));

        block_on(terminal.tick()).unwrap();

        assert_eq!(*terminal.coordinator_state(), CoordinatorState::Idle);
        assert!(matches!(terminal.usage_state(), UsageState::Idle));
    }
}
