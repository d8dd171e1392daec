//! Authorization-facing state: the bounded auth cache and the tag verifier
//! that drives cloud authorization on top of NFC arrivals (spec §4.3, §4.8).

pub mod auth_cache;
pub mod tag_verifier;

pub use auth_cache::AuthCache;
pub use tag_verifier::{TagVerifier, TagVerifierObserver, VerifierState};
