use super::{FirebaseId, TagUid};
use alloc::collections::BTreeSet;
use alloc::string::String;

/// In-memory projection of a cloud-issued session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSession {
    pub session_id: FirebaseId,
    pub token_id: TagUid,
    pub expiry_epoch_s: i64,
    pub user_id: FirebaseId,
    pub user_label: String,
    pub permissions: BTreeSet<String>,
}

impl TokenSession {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Permissions from `required` that this session does not hold.
    pub fn missing_permissions<'a>(
        &self,
        required: impl IntoIterator<Item = &'a String>,
    ) -> alloc::vec::Vec<String> {
        required
            .into_iter()
            .filter(|p| !self.has_permission(p))
            .cloned()
            .collect()
    }
}
