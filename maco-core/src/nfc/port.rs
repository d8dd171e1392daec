//! The PN532-frame boundary the spec places out of scope: the reader issues
//! an `InDataExchange`-shaped passthrough (grounded on the real `pn532`
//! crate's `Request`/`Command` surface) and never builds raw PN532 frames
//! itself above this trait.

use crate::types::AppTag;
use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    /// Timeouts, CRC/parity/framing errors, RF inactive.
    TagGone,
    /// Internal buffer overflow / framing inconsistency.
    Desync,
    Other,
}

/// Low-level PCD operations the reader state machine drives. A real
/// implementation wraps a `pn532::Pn532<I, Timer>` the way the teacher's
/// `pn532_ext` wraps it for NTAG operations; this crate only depends on the
/// shape above the raw frame format.
pub trait Pn532Port {
    /// Polls once for a new ISO-14443-A target. `None` if nothing answered
    /// within `timeout`.
    async fn poll_for_target(&mut self, timeout: Duration) -> Result<Option<AppTag>, PortError>;

    /// Selects `target_number`, returning whether it supports ISO 14443-4
    /// APDU framing.
    async fn select(&mut self, target_number: u8) -> Result<bool, PortError>;

    async fn release(&mut self, target_number: u8) -> Result<(), PortError>;

    /// `InDataExchange`: sends `command` to `target_number`, writes the
    /// response into `response`, returns the number of bytes written.
    async fn transceive(
        &mut self,
        target_number: u8,
        command: &[u8],
        response: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PortError>;

    /// A short presence check against the currently-selected target,
    /// without a full transceive.
    async fn presence_ping(&mut self, target_number: u8) -> Result<bool, PortError>;

    /// PCD-level reset, used for `TagError` recovery.
    async fn reset_pcd(&mut self) -> Result<(), PortError>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use alloc::collections::VecDeque;

    #[derive(Debug, Clone)]
    pub enum ScriptedCall {
        PollForTarget(Result<Option<AppTag>, PortError>),
        Select(Result<bool, PortError>),
        Release(Result<(), PortError>),
        Transceive(Result<alloc::vec::Vec<u8>, PortError>),
        PresencePing(Result<bool, PortError>),
        ResetPcd(Result<(), PortError>),
    }

    /// Replays a fixed script of responses in order; panics if the reader
    /// calls a different operation than the next scripted one, or runs the
    /// script out.
    #[derive(Default)]
    pub struct MockPn532Port {
        script: VecDeque<ScriptedCall>,
    }

    impl MockPn532Port {
        pub fn new() -> Self {
            Self {
                script: VecDeque::new(),
            }
        }

        pub fn push(&mut self, call: ScriptedCall) -> &mut Self {
            self.script.push_back(call);
            self
        }

        fn next(&mut self) -> ScriptedCall {
            self.script
                .pop_front()
                .expect("mock pn532 port script exhausted")
        }
    }

    impl Pn532Port for MockPn532Port {
        async fn poll_for_target(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<AppTag>, PortError> {
            match self.next() {
                ScriptedCall::PollForTarget(r) => r,
                other => panic!("expected poll_for_target, script had {other:?}"),
            }
        }

        async fn select(&mut self, _target_number: u8) -> Result<bool, PortError> {
            match self.next() {
                ScriptedCall::Select(r) => r,
                other => panic!("expected select, script had {other:?}"),
            }
        }

        async fn release(&mut self, _target_number: u8) -> Result<(), PortError> {
            match self.next() {
                ScriptedCall::Release(r) => r,
                other => panic!("expected release, script had {other:?}"),
            }
        }

        async fn transceive(
            &mut self,
            _target_number: u8,
            _command: &[u8],
            response: &mut [u8],
            _timeout: Duration,
        ) -> Result<usize, PortError> {
            match self.next() {
                ScriptedCall::Transceive(Ok(bytes)) => {
                    response[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                ScriptedCall::Transceive(Err(e)) => Err(e),
                other => panic!("expected transceive, script had {other:?}"),
            }
        }

        async fn presence_ping(&mut self, _target_number: u8) -> Result<bool, PortError> {
            match self.next() {
                ScriptedCall::PresencePing(r) => r,
                other => panic!("expected presence_ping, script had {other:?}"),
            }
        }

        async fn reset_pcd(&mut self) -> Result<(), PortError> {
            match self.next() {
                ScriptedCall::ResetPcd(r) => r,
                other => panic!("expected reset_pcd, script had {other:?}"),
            }
        }
    }
}
