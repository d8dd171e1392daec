//! NFC Reader (spec §4.1): owns the PN532 front-end, drives the
//! tag-presence state machine, and serializes APDU transceive against a
//! single mutex (here: exclusive `&mut self` access from the one task
//! expected to own the reader, matching §5's "NFC worker" ownership).

use super::action::{ActionStep, NfcAction};
use super::port::{Pn532Port, PortError};
use crate::error::MacoError;
use crate::types::{NfcState, TagUid};
use alloc::boxed::Box;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use heapless::Deque;

pub const TICK_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const UNSUPPORTED_RETRY_TIMEOUT: Duration = Duration::from_millis(100);
pub const MAX_SUBSCRIBERS: usize = 4;
pub const MAX_TAG_ERROR_RETRIES: u8 = 3;
pub const ACTION_QUEUE_CAPACITY: usize = 2;

/// AID `D2 76 00 00 85 01 01` select + terminal-key `Authenticate` happen
/// here; by the time `TagArrived` is emitted the real UID has already been
/// read via `GetCardUID`. `TagVerifier` (§4.3) reacts to this event and owns
/// the *cloud*-key re-authentication on the same physical tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfcEvent {
    TagArrived(TagUid),
    TagDeparted,
}

struct Subscriber {
    active: core::sync::atomic::AtomicBool,
    signal: Signal<CriticalSectionRawMutex, NfcEvent>,
}

impl Subscriber {
    const fn new() -> Self {
        Self {
            active: core::sync::atomic::AtomicBool::new(false),
            signal: Signal::new(),
        }
    }
}

pub struct NfcReader<P: Pn532Port> {
    port: P,
    state: NfcState,
    started: bool,
    subscribers: [Subscriber; MAX_SUBSCRIBERS],
    action_queue: Deque<Box<dyn NfcAction<P>>, ACTION_QUEUE_CAPACITY>,
}

impl<P: Pn532Port> NfcReader<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            state: NfcState::WaitingForTag,
            started: false,
            subscribers: core::array::from_fn(|_| Subscriber::new()),
            action_queue: Deque::new(),
        }
    }

    /// Idempotent: returns `WrongState` on a second call.
    pub fn start(&mut self) -> Result<(), MacoError> {
        if self.started {
            return Err(MacoError::WrongState);
        }
        self.started = true;
        Ok(())
    }

    pub fn has_tag(&self) -> bool {
        self.state.tag().is_some()
    }

    pub fn current_tag(&self) -> &NfcState {
        &self.state
    }

    /// Resolves on the next `TagArrived`/`TagDeparted`. Each concurrent
    /// caller gets its own slot and is served the next event after it
    /// subscribed; events emitted while nobody is subscribed are dropped.
    pub async fn subscribe_event(&self) -> Result<NfcEvent, MacoError> {
        let slot = self
            .subscribers
            .iter()
            .find(|s| {
                s.active
                    .compare_exchange(
                        false,
                        true,
                        core::sync::atomic::Ordering::AcqRel,
                        core::sync::atomic::Ordering::Acquire,
                    )
                    .is_ok()
            })
            .ok_or(MacoError::Unspecified {
                message: "no free NFC event subscriber slot".into(),
            })?;
        let event = slot.signal.wait().await;
        slot.active
            .store(false, core::sync::atomic::Ordering::Release);
        Ok(event)
    }

    fn emit_event(&self, event: NfcEvent) {
        for slot in &self.subscribers {
            if slot.active.load(core::sync::atomic::Ordering::Acquire) {
                slot.signal.signal(event);
            }
        }
    }

    /// Valid while a tag is selected, whether or not the terminal-key
    /// handshake has completed yet - `nfc::ntag424::protocol` drives
    /// `SelectApplication`/`Authenticate`/`GetCardUID` through here while
    /// still `Ntag424Unauthenticated`, then calls `mark_authenticated`.
    /// Serialized by virtue of `&mut self` having a single owner.
    pub async fn request_transceive(
        &mut self,
        command: &[u8],
        response: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, MacoError> {
        let target_number = match &self.state {
            NfcState::Ntag424Unauthenticated { tag, .. } => tag.target_number,
            NfcState::Ntag424Authenticated { tag, .. } => tag.target_number,
            _ => return Err(MacoError::NoTag),
        };
        self.port
            .transceive(target_number, command, response, timeout)
            .await
            .map_err(classify_port_error)
    }

    /// Queues an action to run while the tag stays authenticated. Returns
    /// `false` if the queue is full.
    pub fn enqueue_action(&mut self, action: Box<dyn NfcAction<P>>) -> bool {
        self.action_queue.push_back(action).is_ok()
    }

    fn abort_action_queue(&mut self, reason: MacoError) {
        while let Some(mut action) = self.action_queue.pop_front() {
            action.on_abort(reason_clone(&reason));
        }
    }

    /// One iteration of the ~10 ms tick loop (spec §4.1 table). Returns the
    /// `NfcEvent` it emitted, if any - `TagArrived` instead comes back from
    /// `mark_authenticated`, called by the terminal-key handshake driver
    /// once it completes, since that happens outside this function.
    pub async fn tick(&mut self) -> Option<NfcEvent> {
        match core::mem::replace(&mut self.state, NfcState::WaitingForTag) {
            NfcState::WaitingForTag => {
                self.tick_waiting_for_tag().await;
                None
            }
            NfcState::TagPresent { tag } => {
                self.tick_tag_present(tag).await;
                None
            }
            NfcState::UnsupportedTag { tag } => {
                self.tick_unsupported_tag(tag).await;
                None
            }
            NfcState::Ntag424Unauthenticated {
                tag,
                anti_collision_uid,
            } => {
                self.tick_ntag_unauthenticated(tag, anti_collision_uid)
                    .await;
                None
            }
            NfcState::Ntag424Authenticated { tag, real_uid } => {
                self.tick_ntag_authenticated(tag, real_uid).await
            }
            NfcState::TagError { tag, retry_count } => {
                self.tick_tag_error(tag, retry_count).await;
                None
            }
        }
    }

    async fn tick_waiting_for_tag(&mut self) {
        match self.port.poll_for_target(TICK_POLL_TIMEOUT).await {
            Ok(Some(tag)) => {
                log::debug!("nfc: target detected, target_number={}", tag.target_number);
                self.state = NfcState::TagPresent { tag };
            }
            Ok(None) => self.state = NfcState::WaitingForTag,
            Err(e) => {
                log::trace!("nfc: poll_for_target error while waiting: {e:?}");
                self.state = NfcState::WaitingForTag;
            }
        }
    }

    async fn tick_tag_present(&mut self, tag: crate::types::AppTag) {
        let target_number = tag.target_number;
        match self.port.select(target_number).await {
            Ok(true) => {
                // ISO 14443-4 capable. The protocol layer now drives
                // SelectApplication + Authenticate + GetCardUID over
                // request_transceive and calls mark_authenticated when done.
                self.state = NfcState::Ntag424Unauthenticated {
                    tag,
                    anti_collision_uid: heapless::Vec::new(),
                };
            }
            Ok(false) => {
                log::debug!("nfc: target does not support ISO 14443-4");
                self.state = NfcState::UnsupportedTag { tag };
            }
            Err(e) => {
                log::warn!("nfc: select failed: {e:?}");
                self.state = classify_and_recover(tag, e);
            }
        }
    }

    async fn tick_unsupported_tag(&mut self, tag: crate::types::AppTag) {
        let target_number = tag.target_number;
        let _ = self.port.release(target_number).await;
        match self
            .port
            .poll_for_target(UNSUPPORTED_RETRY_TIMEOUT)
            .await
        {
            Ok(None) => self.state = NfcState::WaitingForTag,
            Ok(Some(tag)) => self.state = NfcState::UnsupportedTag { tag },
            Err(_) => self.state = NfcState::WaitingForTag,
        }
    }

    async fn tick_ntag_unauthenticated(
        &mut self,
        tag: crate::types::AppTag,
        anti_collision_uid: heapless::Vec<u8, 10>,
    ) {
        // The real authentication handshake (SelectApplication,
        // AuthenticateEV2First, GetCardUID) is driven by the protocol layer
        // through `request_transceive` from the component that owns the
        // reader (see `nfc::ntag424::protocol`); by the time this state is
        // left, a caller has already driven that handshake to completion or
        // failure via the transceive surface above. A bare presence check
        // here just detects tag loss while that's in progress.
        match self.port.presence_ping(tag.target_number).await {
            Ok(true) => {
                self.state = NfcState::Ntag424Unauthenticated {
                    tag,
                    anti_collision_uid,
                }
            }
            Ok(false) | Err(_) => self.state = NfcState::WaitingForTag,
        }
    }

    /// Called by the authentication driver once `Authenticate` +
    /// `GetCardUID` succeed, to move the reader into the authenticated
    /// state and emit `TagArrived`.
    pub fn mark_authenticated(&mut self, real_uid: TagUid) -> Result<(), MacoError> {
        let NfcState::Ntag424Unauthenticated { tag, .. } =
            core::mem::replace(&mut self.state, NfcState::WaitingForTag)
        else {
            return Err(MacoError::WrongState);
        };
        self.state = NfcState::Ntag424Authenticated {
            tag,
            real_uid: real_uid.clone(),
        };
        self.emit_event(NfcEvent::TagArrived(real_uid));
        Ok(())
    }

    /// Test-only: jumps straight to `Ntag424Authenticated` so a test can
    /// drive `tick()`/queued actions without replaying the full
    /// select+handshake sequence through a scripted port.
    #[cfg(test)]
    pub fn force_authenticated_for_test(&mut self, real_uid: TagUid) {
        let tag = crate::types::AppTag::new(&[0x04, 0x01, 0x02, 0x03], 0x20, 1, true).unwrap();
        self.state = NfcState::Ntag424Authenticated { tag, real_uid };
    }

    async fn tick_ntag_authenticated(
        &mut self,
        tag: crate::types::AppTag,
        real_uid: TagUid,
    ) -> Option<NfcEvent> {
        match self.port.presence_ping(tag.target_number).await {
            Ok(true) => {
                // Restored before the action queue runs, not after: a
                // queued action's `step` takes `&mut NfcReader<P>`, and
                // needs to see the tag as authenticated, not the
                // `WaitingForTag` placeholder `core::mem::replace` left in
                // `self.state` for the duration of this tick.
                self.state = NfcState::Ntag424Authenticated { tag, real_uid };
                if let Some(mut action) = self.action_queue.pop_front() {
                    match action.step(self).await {
                        Ok(ActionStep::Done) => {}
                        Ok(ActionStep::Continue) => {
                            let _ = self.action_queue.push_front(action);
                        }
                        Err(e) => {
                            log::warn!("nfc: action step failed: {e:?}");
                            let _ = self.action_queue.push_front(action);
                        }
                    }
                }
                None
            }
            Ok(false) => {
                log::debug!("nfc: tag departed while authenticated");
                self.abort_action_queue(MacoError::NoTag);
                self.state = NfcState::WaitingForTag;
                self.emit_event(NfcEvent::TagDeparted);
                Some(NfcEvent::TagDeparted)
            }
            Err(e) => {
                log::warn!("nfc: presence ping error while authenticated: {e:?}");
                self.abort_action_queue(MacoError::NoTag);
                self.emit_event(NfcEvent::TagDeparted);
                self.state = classify_and_recover(tag, e);
                Some(NfcEvent::TagDeparted)
            }
        }
    }

    async fn tick_tag_error(&mut self, tag: crate::types::AppTag, retry_count: u8) {
        let target_number = tag.target_number;
        if retry_count >= MAX_TAG_ERROR_RETRIES {
            log::warn!("nfc: resetting PCD after {retry_count} failed releases");
            let _ = self.port.reset_pcd().await;
            self.state = NfcState::WaitingForTag;
            return;
        }
        match self.port.release(target_number).await {
            Ok(()) => self.state = NfcState::WaitingForTag,
            Err(_) => {
                self.state = NfcState::TagError {
                    tag,
                    retry_count: retry_count + 1,
                }
            }
        }
    }
}

fn classify_and_recover(tag: crate::types::AppTag, error: PortError) -> NfcState {
    match error {
        PortError::TagGone => NfcState::WaitingForTag,
        PortError::Desync | PortError::Other => NfcState::TagError {
            tag,
            retry_count: 0,
        },
    }
}

fn classify_port_error(error: PortError) -> MacoError {
    match error {
        PortError::TagGone => MacoError::NoTag,
        PortError::Desync => MacoError::Desync,
        PortError::Other => MacoError::Unspecified {
            message: "PN532 port error".into(),
        },
    }
}

fn reason_clone(reason: &MacoError) -> MacoError {
    match reason {
        MacoError::NoTag => MacoError::NoTag,
        MacoError::Desync => MacoError::Desync,
        other => MacoError::Unspecified {
            message: alloc::format!("{other}"),
        },
    }
}
