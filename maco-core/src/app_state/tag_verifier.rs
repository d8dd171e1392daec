//! Tag Verifier (spec §4.3): reacts to NFC arrivals and drives cloud
//! authorization. By the time `NfcReader` emits `TagArrived`, it has already
//! performed steps (1) confirm NTAG 424, (2) authenticate with the terminal
//! key, (3) read the real UID (see `nfc::reader` / `nfc::ntag424::protocol`)
//! - this component picks up at step (4), obtaining cloud authorization.

use super::auth_cache::AuthCache;
use crate::clock::MonotonicClock;
use crate::error::MacoError;
use crate::firebase::{FirebaseClient, Forward, TerminalCheckinOutcome};
use crate::nfc::ntag424::protocol;
use crate::nfc::{NfcReader, Pn532Port};
use crate::observer::Observers;
use crate::types::{FirebaseId, TagUid};
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::String;

const MAX_OBSERVERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierState {
    Idle,
    Verifying,
    TagVerified(TagUid),
    Authorizing,
    Authorized {
        tag_uid: TagUid,
        user_id: FirebaseId,
        user_label: String,
        auth_id: FirebaseId,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    },
    Unauthorized,
}

/// One method per transition, all with empty default bodies - a test
/// observer overrides only what it checks (mirrors the original's
/// `tag_verifier_observer.h`).
#[allow(unused_variables)]
pub trait TagVerifierObserver {
    fn on_tag_detected(&mut self, tag_uid: TagUid) {}
    fn on_verifying(&mut self) {}
    fn on_tag_verified(&mut self, tag_uid: TagUid) {}
    fn on_unknown_tag(&mut self) {}
    fn on_authorizing(&mut self) {}
    fn on_authorized(&mut self, tag_uid: TagUid, user_label: &str, auth_id: &FirebaseId) {}
    fn on_unauthorized(&mut self) {}
    fn on_tag_removed(&mut self) {}
}

pub struct TagVerifier<C: MonotonicClock> {
    state: VerifierState,
    observers: Observers<dyn TagVerifierObserver, MAX_OBSERVERS>,
    auth_cache: AuthCache<C>,
}

impl<C: MonotonicClock> TagVerifier<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: VerifierState::Idle,
            observers: Observers::new(),
            auth_cache: AuthCache::new(clock),
        }
    }

    pub fn state(&self) -> &VerifierState {
        &self.state
    }

    pub fn auth_cache(&self) -> &AuthCache<C> {
        &self.auth_cache
    }

    pub fn register_observer(
        &mut self,
        observer: Box<dyn TagVerifierObserver>,
    ) -> Result<(), MacoError> {
        self.observers.register(observer).map_err(|_| MacoError::Unspecified {
            message: "tag verifier observer capacity exceeded".into(),
        })
    }

    /// `TagRemoved` at any point transitions back to idle, cancelling
    /// whatever the caller was awaiting (the caller must stop polling the
    /// in-flight `handle_tag_arrived` future; this just resets the observed
    /// state).
    pub fn handle_tag_departed(&mut self) {
        if self.state != VerifierState::Idle {
            self.state = VerifierState::Idle;
            self.observers.for_each_mut(|o| o.on_tag_removed());
        }
    }

    /// Steps 1-3 of spec §4.3 only: tag-detected/verifying/tag-verified
    /// observer notifications plus the auth-cache lookup. Returns `true` on
    /// a cache hit, in which case `set_authorized` has already run and
    /// there is nothing left for the caller to do. Returns `false` on a
    /// cache miss, leaving `state` at `Authorizing` for the caller to drive
    /// the cloud check-in itself (e.g. through a queued `NfcAction`) and
    /// report back via `finish_cloud_authorization`/`mark_unauthorized`.
    pub fn begin_tag_arrival(&mut self, real_uid: TagUid) -> bool {
        self.observers.for_each_mut(|o| o.on_tag_detected(real_uid));

        self.state = VerifierState::Verifying;
        self.observers.for_each_mut(|o| o.on_verifying());

        self.state = VerifierState::TagVerified(real_uid);
        self.observers.for_each_mut(|o| o.on_tag_verified(real_uid));

        if let Some(cached) = self.auth_cache.lookup(real_uid) {
            self.set_authorized(
                real_uid,
                cached.user_id,
                cached.user_label,
                cached.auth_id,
                cached.permissions,
                cached.session_expiry_epoch_s,
            );
            return true;
        }

        self.state = VerifierState::Authorizing;
        self.observers.for_each_mut(|o| o.on_authorizing());
        false
    }

    /// Reports a cloud authorization reached outside `handle_tag_arrived`
    /// (the `StartSessionAction` path). `cache` mirrors whether the source
    /// of the authorization should be remembered for future arrivals —
    /// `true` for a fresh cloud grant, matching `handle_tag_arrived`'s own
    /// `insert` calls.
    #[allow(clippy::too_many_arguments)]
    pub fn finish_cloud_authorization(
        &mut self,
        tag_uid: TagUid,
        auth_id: FirebaseId,
        user_id: FirebaseId,
        user_label: String,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
        cache: bool,
    ) {
        if cache {
            self.auth_cache.insert(
                tag_uid,
                auth_id.clone(),
                user_id.clone(),
                user_label.clone(),
                permissions.clone(),
                session_expiry_epoch_s,
            );
        }
        self.set_authorized(
            tag_uid,
            user_id,
            user_label,
            auth_id,
            permissions,
            session_expiry_epoch_s,
        );
    }

    /// Counterpart to `finish_cloud_authorization` for a cloud flow
    /// (started via `begin_tag_arrival` returning `false`) that ended up
    /// rejected or failed.
    pub fn mark_unauthorized(&mut self) {
        self.set_unauthorized();
    }

    /// Runs the full verification + authorization algorithm (spec §4.3
    /// steps 1-5) for a tag the reader has already authenticated with the
    /// terminal key. `reader` is only touched again if a fresh cloud
    /// authentication leg is needed (cache miss, no existing cloud auth).
    pub async fn handle_tag_arrived<P: Pn532Port, F: Forward>(
        &mut self,
        reader: &mut NfcReader<P>,
        client: &FirebaseClient<F>,
        real_uid: TagUid,
        authorization_key_slot: u8,
    ) -> Result<(), MacoError> {
        self.observers.for_each_mut(|o| o.on_tag_detected(real_uid));

        self.state = VerifierState::Verifying;
        self.observers.for_each_mut(|o| o.on_verifying());

        self.state = VerifierState::TagVerified(real_uid);
        self.observers.for_each_mut(|o| o.on_tag_verified(real_uid));

        if let Some(cached) = self.auth_cache.lookup(real_uid) {
            self.set_authorized(
                real_uid,
                cached.user_id,
                cached.user_label,
                cached.auth_id,
                cached.permissions,
                cached.session_expiry_epoch_s,
            );
            return Ok(());
        }

        self.state = VerifierState::Authorizing;
        self.observers.for_each_mut(|o| o.on_authorizing());

        let outcome = match client.terminal_checkin(real_uid).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("tag verifier: terminal_checkin failed: {e:?}");
                self.set_unauthorized();
                return Ok(());
            }
        };

        match outcome {
            TerminalCheckinOutcome::Rejected { message } => {
                log::info!("tag verifier: terminal_checkin rejected: {message}");
                self.set_unauthorized();
            }
            TerminalCheckinOutcome::AuthorizedWithExistingAuth {
                user_id,
                user_label,
                auth_id,
                permissions,
                session_expiry_epoch_s,
            } => {
                self.auth_cache.insert(
                    real_uid,
                    auth_id.clone(),
                    user_id.clone(),
                    user_label.clone(),
                    permissions.clone(),
                    session_expiry_epoch_s,
                );
                self.set_authorized(
                    real_uid,
                    user_id,
                    user_label,
                    auth_id,
                    permissions,
                    session_expiry_epoch_s,
                );
            }
            TerminalCheckinOutcome::AuthorizedNoAuth {
                user_id,
                user_label,
                permissions,
                session_expiry_epoch_s,
            } => {
                self.authorize_via_cloud_key(
                    reader,
                    client,
                    real_uid,
                    authorization_key_slot,
                    user_id,
                    user_label,
                    permissions,
                    session_expiry_epoch_s,
                )
                .await;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn authorize_via_cloud_key<P: Pn532Port, F: Forward>(
        &mut self,
        reader: &mut NfcReader<P>,
        client: &FirebaseClient<F>,
        real_uid: TagUid,
        authorization_key_slot: u8,
        user_id: FirebaseId,
        user_label: String,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    ) {
        let result =
            protocol::authenticate_cloud_key(reader, client, real_uid, authorization_key_slot)
                .await;

        match result {
            Ok(auth_id) => {
                self.auth_cache.insert(
                    real_uid,
                    auth_id.clone(),
                    user_id.clone(),
                    user_label.clone(),
                    permissions.clone(),
                    session_expiry_epoch_s,
                );
                self.set_authorized(
                    real_uid,
                    user_id,
                    user_label,
                    auth_id,
                    permissions,
                    session_expiry_epoch_s,
                );
            }
            Err(e) => {
                log::warn!("tag verifier: cloud key authentication failed: {e:?}");
                self.set_unauthorized();
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn set_authorized(
        &mut self,
        tag_uid: TagUid,
        user_id: FirebaseId,
        user_label: String,
        auth_id: FirebaseId,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    ) {
        self.state = VerifierState::Authorized {
            tag_uid,
            user_id,
            user_label: user_label.clone(),
            auth_id: auth_id.clone(),
            permissions,
            session_expiry_epoch_s,
        };
        self.observers
            .for_each_mut(|o| o.on_authorized(tag_uid, &user_label, &auth_id));
    }

    fn set_unauthorized(&mut self) {
        self.state = VerifierState::Unauthorized;
        self.observers.for_each_mut(|o| o.on_unauthorized());
    }
}
