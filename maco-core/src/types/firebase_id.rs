use crate::error::MacoError;
use heapless::String as HString;
use serde::{Deserialize, Serialize};

/// Opaque handle for a cloud-owned object (authorization record, user id).
/// Short ASCII string, at most 20 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirebaseId(HString<20>);

impl FirebaseId {
    pub fn new(s: &str) -> Result<Self, MacoError> {
        if s.len() > 20 || !s.is_ascii() {
            return Err(MacoError::MalformedResponse);
        }
        let mut inner = HString::new();
        inner.push_str(s).map_err(|_| MacoError::MalformedResponse)?;
        Ok(Self(inner))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for FirebaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
