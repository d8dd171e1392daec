//! Host-only stand-ins for the hardware/transport boundaries `maco-core`
//! depends on. These are deliberately separate from `maco-core`'s own
//! `#[cfg(test)]` mocks (those aren't visible outside its test builds); the
//! shapes mirror them closely since both are grounded on the same traits.

use maco_core::clock::{MonotonicClock, WallClock};
use maco_core::firebase::{Forward, ForwardResponse};
use maco_core::nfc::{Pn532Port, PortError};
use maco_core::session::history_store::FileSystem;
use maco_core::session::RelayGpio;
use maco_core::types::AppTag;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

/// Never actually driven in these scenarios: every replayed outcome is
/// either a cache hit or an `AuthorizedWithExistingAuth`/`Rejected`
/// terminal-checkin result, none of which re-enter the NTAG 424 protocol
/// layer. Kept only to satisfy `TagVerifier::handle_tag_arrived`'s
/// `&mut NfcReader<P>` parameter.
#[derive(Default)]
pub struct UnusedPn532Port;

impl Pn532Port for UnusedPn532Port {
    async fn poll_for_target(
        &mut self,
        _timeout: embassy_time::Duration,
    ) -> Result<Option<AppTag>, PortError> {
        unreachable!("scenario replay never polls the PCD directly")
    }

    async fn select(&mut self, _target_number: u8) -> Result<bool, PortError> {
        unreachable!("scenario replay never re-selects the tag")
    }

    async fn release(&mut self, _target_number: u8) -> Result<(), PortError> {
        unreachable!("scenario replay never releases the tag")
    }

    async fn transceive(
        &mut self,
        _target_number: u8,
        _command: &[u8],
        _response: &mut [u8],
        _timeout: embassy_time::Duration,
    ) -> Result<usize, PortError> {
        unreachable!("scenario replay never re-authenticates against the PCD")
    }

    async fn presence_ping(&mut self, _target_number: u8) -> Result<bool, PortError> {
        unreachable!("scenario replay never pings presence directly")
    }

    async fn reset_pcd(&mut self) -> Result<(), PortError> {
        unreachable!("scenario replay never resets the PCD")
    }
}

#[derive(Clone)]
pub struct ScriptedResponse {
    pub endpoint: &'static str,
    pub status: u16,
    pub body: Vec<u8>,
    pub error: Option<String>,
}

impl ScriptedResponse {
    pub fn ok(endpoint: &'static str, body: Vec<u8>) -> Self {
        Self {
            endpoint,
            status: 200,
            body,
            error: None,
        }
    }
}

/// Replays scripted responses in order, recording calls per endpoint so a
/// scenario can assert "the cloud mock records zero calls" the way the
/// literal scenario text does.
#[derive(Default)]
pub struct ScenarioTransport {
    script: RefCell<VecDeque<ScriptedResponse>>,
    calls: RefCell<Vec<String>>,
}

impl ScenarioTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ScriptedResponse) -> &Self {
        self.script.borrow_mut().push_back(response);
        self
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls.borrow().iter().filter(|e| e.as_str() == endpoint).count()
    }
}

impl Forward for ScenarioTransport {
    async fn forward(
        &self,
        endpoint: &str,
        _payload: &[u8],
    ) -> Result<ForwardResponse, maco_core::MacoError> {
        self.calls.borrow_mut().push(endpoint.into());
        let response = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("scenario transport script exhausted for {endpoint}"));
        Ok(ForwardResponse {
            status: response.status,
            body: response.body,
            error: response.error,
        })
    }
}

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
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, maco_core::session::history_store::FileError> {
        Ok(self.files.get(path).cloned())
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), maco_core::session::history_store::FileError> {
        self.files.insert(path.into(), data.into());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockRelayGpio {
    energized: bool,
}

impl MockRelayGpio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelayGpio for MockRelayGpio {
    async fn configure_output(&mut self) {}

    async fn write(&mut self, energized: bool) {
        self.energized = energized;
    }

    async fn configure_input(&mut self) {}

    async fn read(&mut self) -> bool {
        self.energized
    }
}

pub struct SimWallClock {
    epoch_s: Cell<i64>,
}

impl SimWallClock {
    pub fn new(epoch_s: i64) -> Self {
        Self {
            epoch_s: Cell::new(epoch_s),
        }
    }

    pub fn advance(&self, delta_s: i64) {
        self.epoch_s.set(self.epoch_s.get() + delta_s);
    }
}

impl WallClock for SimWallClock {
    fn now_epoch_s(&self) -> i64 {
        self.epoch_s.get()
    }
}

pub struct SimMonotonicClock {
    now: Cell<embassy_time::Instant>,
}

impl SimMonotonicClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(embassy_time::Instant::from_secs(0)),
        }
    }

    pub fn advance(&self, duration: embassy_time::Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Default for SimMonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SimMonotonicClock {
    fn now(&self) -> embassy_time::Instant {
        self.now.get()
    }
}
