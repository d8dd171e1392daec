//! Usage-History Store (spec §4.6): crash-safe append-style log of
//! `UsageRecord`s, one file per machine.

use crate::error::MacoError;
use crate::types::UsageHistory;
use alloc::format;
use alloc::string::String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileError;

impl From<FileError> for MacoError {
    fn from(_: FileError) -> Self {
        MacoError::Unspecified {
            message: "usage history file I/O error".into(),
        }
    }
}

/// The filesystem boundary. A real implementation is a thin wrapper over
/// the device's flash filesystem; `test_support::InMemoryFileSystem` backs
/// tests.
pub trait FileSystem {
    fn read(&self, path: &str) -> Result<Option<alloc::vec::Vec<u8>>, FileError>;
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), FileError>;
}

pub fn history_path(machine_id: &str) -> String {
    format!("/machine_{machine_id}/machine_history.data")
}

/// Overwrites the whole file on every call - the record set is small (a few
/// hundred entries between uploads) and the target FS has internal
/// journaling, so whole-file rewrite is cheap and simple relative to a
/// true append log.
pub fn persist<F: FileSystem>(fs: &mut F, history: &UsageHistory) -> Result<(), MacoError> {
    let bytes = postcard::to_allocvec(history).map_err(|_| MacoError::Unspecified {
        message: "usage history encode failure".into(),
    })?;
    fs.write(&history_path(&history.machine_id), &bytes)?;
    Ok(())
}

/// Loads the history file for `machine_id`. A missing file yields an empty
/// history. A file whose stored `machine_id` does not match is discarded
/// (logged, not accepted) rather than returned - we never adopt another
/// machine's records.
pub fn load<F: FileSystem>(fs: &F, machine_id: &str) -> Result<UsageHistory, MacoError> {
    let Some(bytes) = fs.read(&history_path(machine_id))? else {
        return Ok(UsageHistory::new(machine_id.into()));
    };
    match postcard::from_bytes::<UsageHistory>(&bytes) {
        Ok(history) if history.machine_id == machine_id => Ok(history),
        Ok(history) => {
            log::warn!(
                "usage history: discarding file for machine_id={}, expected {machine_id}",
                history.machine_id
            );
            Ok(UsageHistory::new(machine_id.into()))
        }
        Err(e) => {
            log::warn!("usage history: failed to decode history file: {e}");
            Ok(UsageHistory::new(machine_id.into()))
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::{FileError, FileSystem};
    use alloc::collections::BTreeMap;
    use alloc::string::String;
    use alloc::vec::Vec;

    #[derive(Default)]
    pub struct InMemoryFileSystem {
        files: BTreeMap<String, Vec<u8>>,
    }

    impl InMemoryFileSystem {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl FileSystem for InMemoryFileSystem {
        fn read(&self, path: &str) -> Result<Option<Vec<u8>>, FileError> {
            Ok(self.files.get(path).cloned())
        }

        fn write(&mut self, path: &str, data: &[u8]) -> Result<(), FileError> {
            self.files.insert(path.into(), data.into());
            Ok(())
        }
    }
}
