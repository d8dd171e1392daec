//! Typed RPC facade over a generic `forward(endpoint, bytes)` transport
//! (spec §4.7). One in-flight call per endpoint; a second call of the same
//! method before the first resolves fails with `Unavailable`, matching the
//! single-slot value-future model in
//! `examples/original_source/maco_firmware/modules/firebase/
//! firebase_client.h`.

use super::types::*;
use crate::error::MacoError;
use crate::types::{FirebaseId, KeyBytes, TagUid, UsageHistory};
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

/// Transport-level response: a 2xx-style success flag (here, an explicit
/// status code), the HTTP status, and an optional error string - spec §6:
/// "request bytes -> response bytes with a 2xx-style success flag ...".
pub struct ForwardResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub error: Option<String>,
}

/// Generic transport the Firebase client forwards typed calls through. The
/// transport itself (HTTP, the gateway protocol) is explicitly out of scope
/// (spec §1 non-goals); this is the boundary the core depends on.
pub trait Forward {
    async fn forward(&self, endpoint: &str, payload: &[u8]) -> Result<ForwardResponse, MacoError>;
}

struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    fn enter(&self) -> Result<SingleFlightGuard<'_>, MacoError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MacoError::Unavailable)?;
        Ok(SingleFlightGuard { flight: self })
    }
}

struct SingleFlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}

pub enum TerminalCheckinOutcome {
    Rejected {
        message: String,
    },
    AuthorizedWithExistingAuth {
        user_id: FirebaseId,
        user_label: String,
        auth_id: FirebaseId,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    },
    AuthorizedNoAuth {
        user_id: FirebaseId,
        user_label: String,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    },
}

pub enum AuthenticateTagOutcome {
    Challenge {
        auth_id: FirebaseId,
        cloud_challenge: [u8; 32],
    },
}

pub enum CompleteTagAuthOutcome {
    Rejected {
        message: String,
    },
    SessionKeys {
        ses_enc_key: KeyBytes,
        ses_mac_key: KeyBytes,
        transaction_id: [u8; 4],
        picc_capabilities: [u8; 6],
    },
}

pub struct PersonalizeKeys {
    pub application: KeyBytes,
    pub authorization: KeyBytes,
    pub sdm_mac: KeyBytes,
    pub reserved2: KeyBytes,
}

pub struct FirebaseClient<F: Forward> {
    transport: F,
    terminal_checkin: SingleFlight,
    authenticate_tag: SingleFlight,
    complete_tag_auth: SingleFlight,
    personalize: SingleFlight,
    upload_usage: SingleFlight,
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, MacoError> {
    postcard::to_allocvec(value).map_err(|_| MacoError::MalformedResponse)
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, MacoError> {
    postcard::from_bytes(bytes).map_err(|_| MacoError::MalformedResponse)
}

impl<F: Forward> FirebaseClient<F> {
    pub fn transport(&self) -> &F {
        &self.transport
    }

    pub fn new(transport: F) -> Self {
        Self {
            transport,
            terminal_checkin: SingleFlight::new(),
            authenticate_tag: SingleFlight::new(),
            complete_tag_auth: SingleFlight::new(),
            personalize: SingleFlight::new(),
            upload_usage: SingleFlight::new(),
        }
    }

    async fn call(&self, endpoint: &str, payload: Vec<u8>) -> Result<Vec<u8>, MacoError> {
        let response = self.transport.forward(endpoint, &payload).await?;
        if !(200..300).contains(&response.status) {
            return Err(MacoError::CloudError {
                message: response.error.unwrap_or_else(|| "request failed".into()),
            });
        }
        Ok(response.body)
    }

    pub async fn terminal_checkin(
        &self,
        tag_uid: TagUid,
    ) -> Result<TerminalCheckinOutcome, MacoError> {
        let _guard = self.terminal_checkin.enter()?;
        let request = TerminalCheckinRequestWire {
            tag_uid: *tag_uid.as_bytes(),
        };
        let body = self
            .call(TERMINAL_CHECKIN_ENDPOINT, encode(&request)?)
            .await?;
        Ok(match decode::<TerminalCheckinResponseWire>(&body)? {
            TerminalCheckinResponseWire::Rejected { message } => {
                TerminalCheckinOutcome::Rejected { message }
            }
            TerminalCheckinResponseWire::AuthorizedWithExistingAuth {
                user_id,
                user_label,
                auth_id,
                permissions,
                session_expiry_epoch_s,
            } => TerminalCheckinOutcome::AuthorizedWithExistingAuth {
                user_id,
                user_label,
                auth_id,
                permissions,
                session_expiry_epoch_s,
            },
            TerminalCheckinResponseWire::AuthorizedNoAuth {
                user_id,
                user_label,
                permissions,
                session_expiry_epoch_s,
            } => TerminalCheckinOutcome::AuthorizedNoAuth {
                user_id,
                user_label,
                permissions,
                session_expiry_epoch_s,
            },
        })
    }

    pub async fn authenticate_tag(
        &self,
        tag_uid: TagUid,
        key_slot: u8,
        encrypted_rnd_b: [u8; 16],
    ) -> Result<AuthenticateTagOutcome, MacoError> {
        let _guard = self.authenticate_tag.enter()?;
        let request = AuthenticateTagRequestWire {
            tag_uid: *tag_uid.as_bytes(),
            key_slot,
            encrypted_rnd_b,
        };
        let body = self
            .call(AUTHENTICATE_TAG_ENDPOINT, encode(&request)?)
            .await?;
        let response: AuthenticateTagResponseWire = decode(&body)?;
        Ok(AuthenticateTagOutcome::Challenge {
            auth_id: response.auth_id,
            cloud_challenge: response.cloud_challenge,
        })
    }

    pub async fn complete_tag_auth(
        &self,
        auth_id: FirebaseId,
        encrypted_part3: [u8; 32],
    ) -> Result<CompleteTagAuthOutcome, MacoError> {
        let _guard = self.complete_tag_auth.enter()?;
        let request = CompleteTagAuthRequestWire {
            auth_id,
            encrypted_part3,
        };
        let body = self
            .call(COMPLETE_TAG_AUTH_ENDPOINT, encode(&request)?)
            .await?;
        Ok(match decode::<CompleteTagAuthResponseWire>(&body)? {
            CompleteTagAuthResponseWire::Rejected { message } => {
                CompleteTagAuthOutcome::Rejected { message }
            }
            CompleteTagAuthResponseWire::SessionKeys {
                ses_enc_key,
                ses_mac_key,
                ti,
                picc_capabilities,
            } => CompleteTagAuthOutcome::SessionKeys {
                ses_enc_key: KeyBytes::from_bytes(ses_enc_key),
                ses_mac_key: KeyBytes::from_bytes(ses_mac_key),
                transaction_id: ti,
                picc_capabilities,
            },
        })
    }

    pub async fn personalize(&self, tag_uid: TagUid) -> Result<PersonalizeKeys, MacoError> {
        let _guard = self.personalize.enter()?;
        let request = PersonalizeRequestWire {
            tag_uid: *tag_uid.as_bytes(),
        };
        let body = self.call(PERSONALIZE_ENDPOINT, encode(&request)?).await?;
        let response: PersonalizeResponseWire = decode(&body)?;
        Ok(PersonalizeKeys {
            application: KeyBytes::from_bytes(response.application),
            authorization: KeyBytes::from_bytes(response.authorization),
            sdm_mac: KeyBytes::from_bytes(response.sdm_mac),
            reserved2: KeyBytes::from_bytes(response.reserved2),
        })
    }

    pub async fn upload_usage(&self, history: UsageHistory) -> Result<(), MacoError> {
        let _guard = self.upload_usage.enter()?;
        let request = UploadUsageRequestWire { history };
        let body = self.call(UPLOAD_USAGE_ENDPOINT, encode(&request)?).await?;
        let _: UploadUsageResponseWire = decode(&body)?;
        Ok(())
    }

    /// Cloud-side cancellation companion to `KeyProvider::cancel_authentication`.
    /// The real transport has no explicit cancel endpoint (out of scope);
    /// this is a no-op hook kept so `CloudKeyProvider` has a symmetric call
    /// site, matching the original's `CancelAuthentication()` call before
    /// every fresh `CreateNtagChallenge`.
    pub async fn cancel_authentication(&self, _tag_uid: &TagUid) {}
}
