//! `StartSession` action (spec §4.4): the cloud check-in and optional
//! cloud-key re-authentication flow, run through the NFC worker's action
//! queue so a tag departure aborts it via `NfcReader::abort_action_queue`
//! instead of letting it run to completion underneath a tag that already
//! left (spec §8 testable property 12).
//!
//! Mirrors `examples/original_source/firmware/src/logic/action/
//! start_session.cpp`'s `Begin -> AwaitStartSession ->
//! AwaitAuthenticateNewSession -> {Succeeded, Rejected, Failed}` phase
//! handler, which stores the cloud response future and polls it once per
//! tick (`OnAwaitStartSession` returns `std::nullopt` - "stay in this
//! state" - while `state::IsPending(*cloud_response)`). `poll_once` below
//! is the same idea: a single non-blocking poll per `step()` call, with a
//! no-op `core::task::Waker` standing in for the source's own event-loop
//! wakeup (this workspace has no `embassy-executor` task to actually wake).

use crate::error::MacoError;
use crate::firebase::{FirebaseClient, Forward, TerminalCheckinOutcome};
use crate::nfc::action::{ActionStep, BoxFuture, NfcAction};
use crate::nfc::ntag424::protocol;
use crate::nfc::{NfcReader, Pn532Port};
use crate::types::{FirebaseId, TagUid};
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// Outcome of a `StartSessionAction`, written into a shared slot so the
/// side that queued it (`session::Coordinator`) can read it back once the
/// action finishes or is aborted.
#[derive(Debug, Clone)]
pub enum StartSessionOutcome {
    Authorized {
        user_id: FirebaseId,
        user_label: String,
        auth_id: FirebaseId,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    },
    Unauthorized,
    Aborted(MacoError),
}

pub type StartSessionSlot = Rc<RefCell<Option<StartSessionOutcome>>>;

fn noop_raw_waker() -> RawWaker {
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    let vtable = &RawWakerVTable::new(clone, no_op, no_op, no_op);
    RawWaker::new(core::ptr::null(), vtable)
}

fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

/// Polls `fut` exactly once, non-blocking. `None` means it's still pending.
fn poll_once<T>(fut: Pin<&mut (dyn Future<Output = T> + '_)>) -> Option<T> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    match fut.poll(&mut cx) {
        Poll::Ready(value) => Some(value),
        Poll::Pending => None,
    }
}

type CheckinFuture = Pin<Box<dyn Future<Output = Result<TerminalCheckinOutcome, MacoError>>>>;

enum Phase {
    AwaitCheckin(CheckinFuture),
    Done,
}

/// Drives `terminal_checkin` and, if the response demands it, the cloud-key
/// re-authentication leg, writing the result into `slot`. Queued on
/// `NfcReader` (see `app_state::TagVerifier::begin_tag_arrival`'s cache-miss
/// path) rather than awaited inline.
pub struct StartSessionAction<F: Forward> {
    tag_uid: TagUid,
    authorization_key_slot: u8,
    client: Rc<FirebaseClient<F>>,
    slot: StartSessionSlot,
    phase: Phase,
}

impl<F: Forward + 'static> StartSessionAction<F> {
    pub fn new(
        client: Rc<FirebaseClient<F>>,
        tag_uid: TagUid,
        authorization_key_slot: u8,
        slot: StartSessionSlot,
    ) -> Self {
        let checkin_client = client.clone();
        let phase = Phase::AwaitCheckin(Box::pin(async move {
            checkin_client.terminal_checkin(tag_uid).await
        }));
        Self {
            tag_uid,
            authorization_key_slot,
            client,
            slot,
            phase,
        }
    }

    fn finish(&mut self, outcome: StartSessionOutcome) {
        *self.slot.borrow_mut() = Some(outcome);
        self.phase = Phase::Done;
    }
}

impl<P: Pn532Port, F: Forward + 'static> NfcAction<P> for StartSessionAction<F> {
    fn step<'a>(
        &'a mut self,
        reader: &'a mut NfcReader<P>,
    ) -> BoxFuture<'a, Result<ActionStep, MacoError>> {
        Box::pin(async move {
            let checkin_result = match &mut self.phase {
                Phase::AwaitCheckin(fut) => match poll_once(fut.as_mut()) {
                    None => return Ok(ActionStep::Continue),
                    Some(result) => result,
                },
                Phase::Done => return Ok(ActionStep::Done),
            };

            match checkin_result {
                Err(e) => {
                    log::warn!("start session: terminal_checkin failed: {e:?}");
                    self.finish(StartSessionOutcome::Unauthorized);
                }
                Ok(TerminalCheckinOutcome::Rejected { message }) => {
                    log::info!("start session: terminal_checkin rejected: {message}");
                    self.finish(StartSessionOutcome::Unauthorized);
                }
                Ok(TerminalCheckinOutcome::AuthorizedWithExistingAuth {
                    user_id,
                    user_label,
                    auth_id,
                    permissions,
                    session_expiry_epoch_s,
                }) => {
                    self.finish(StartSessionOutcome::Authorized {
                        user_id,
                        user_label,
                        auth_id,
                        permissions,
                        session_expiry_epoch_s,
                    });
                }
                Ok(TerminalCheckinOutcome::AuthorizedNoAuth {
                    user_id,
                    user_label,
                    permissions,
                    session_expiry_epoch_s,
                }) => {
                    // A physically absent tag fails this as a plain
                    // `request_transceive` error (`MacoError::NoTag`), not a
                    // retryable one - finish as `Unauthorized` here rather
                    // than propagating `Err`, which would make
                    // `tick_ntag_authenticated` requeue this action forever.
                    match protocol::authenticate_cloud_key(
                        reader,
                        &self.client,
                        self.tag_uid,
                        self.authorization_key_slot,
                    )
                    .await
                    {
                        Ok(auth_id) => self.finish(StartSessionOutcome::Authorized {
                            user_id,
                            user_label,
                            auth_id,
                            permissions,
                            session_expiry_epoch_s,
                        }),
                        Err(e) => {
                            log::warn!(
                                "start session: cloud key authentication failed: {e:?}"
                            );
                            self.finish(StartSessionOutcome::Unauthorized);
                        }
                    }
                }
            }
            Ok(ActionStep::Done)
        })
    }

    fn on_abort(&mut self, reason: MacoError) {
        self.slot
            .borrow_mut()
            .get_or_insert(StartSessionOutcome::Aborted(reason));
        self.phase = Phase::Done;
    }
}
