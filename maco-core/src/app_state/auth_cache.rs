//! TTL-bounded authorization cache keyed by `TagUid` (spec §4.8). Owned by
//! the Tag Verifier; single-threaded access, no internal locking.

use crate::clock::MonotonicClock;
use crate::types::{FirebaseId, TagUid};
use alloc::collections::BTreeSet;
use alloc::string::String;
use embassy_time::{Duration, Instant};
use heapless::Vec as HVec;

pub const CAPACITY: usize = 8;
pub const DEFAULT_TTL: Duration = Duration::from_secs(4 * 3600);

#[derive(Debug, Clone)]
struct Entry {
    tag_uid: TagUid,
    auth_id: FirebaseId,
    user_id: FirebaseId,
    user_label: String,
    permissions: BTreeSet<String>,
    session_expiry_epoch_s: i64,
    inserted_at: Instant,
    expiry: Instant,
}

#[derive(Debug, Clone)]
pub struct CachedAuthorization {
    pub auth_id: FirebaseId,
    pub user_id: FirebaseId,
    pub user_label: String,
    pub permissions: BTreeSet<String>,
    pub session_expiry_epoch_s: i64,
}

/// Fixed capacity 8, default TTL 4 h (both configurable). Insertion of an
/// existing key refreshes its value but, deliberately diverging from the
/// original C++'s refresh-on-update, keeps its `inserted_at` unchanged -
/// eviction-by-oldest-insertion only looks at true first-insertion order
/// (spec §8 testable property 7).
pub struct AuthCache<C: MonotonicClock> {
    entries: HVec<Entry, CAPACITY>,
    ttl: Duration,
    clock: C,
}

impl<C: MonotonicClock> AuthCache<C> {
    pub fn new(clock: C) -> Self {
        Self::with_ttl(clock, DEFAULT_TTL)
    }

    pub fn with_ttl(clock: C, ttl: Duration) -> Self {
        Self {
            entries: HVec::new(),
            ttl,
            clock,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        tag_uid: TagUid,
        auth_id: FirebaseId,
        user_id: FirebaseId,
        user_label: String,
        permissions: BTreeSet<String>,
        session_expiry_epoch_s: i64,
    ) {
        let now = self.clock.now();
        let expiry = now + self.ttl;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.tag_uid == tag_uid) {
            entry.auth_id = auth_id;
            entry.user_id = user_id;
            entry.user_label = user_label;
            entry.permissions = permissions;
            entry.session_expiry_epoch_s = session_expiry_epoch_s;
            entry.expiry = expiry;
            return;
        }
        if self.entries.is_full() {
            self.evict_oldest();
        }
        let _ = self.entries.push(Entry {
            tag_uid,
            auth_id,
            user_id,
            user_label,
            permissions,
            session_expiry_epoch_s,
            inserted_at: now,
            expiry,
        });
    }

    /// A hit within TTL returns the entry; an expired hit is removed lazily
    /// and reported as a miss.
    pub fn lookup(&mut self, tag_uid: TagUid) -> Option<CachedAuthorization> {
        let now = self.clock.now();
        let index = self.entries.iter().position(|e| e.tag_uid == tag_uid)?;
        if self.entries[index].expiry <= now {
            self.entries.swap_remove(index);
            return None;
        }
        let entry = &self.entries[index];
        Some(CachedAuthorization {
            auth_id: entry.auth_id.clone(),
            user_id: entry.user_id.clone(),
            user_label: entry.user_label.clone(),
            permissions: entry.permissions.clone(),
            session_expiry_epoch_s: entry.session_expiry_epoch_s,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) {
        let Some((index, _)) = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.inserted_at)
        else {
            return;
        };
        self.entries.swap_remove(index);
    }
}
