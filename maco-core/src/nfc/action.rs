//! Actions queued on the NFC worker so they run in series with PN532 I/O
//! (spec §4.4's `StartSession` action, §5 "Action queue on the NFC worker is
//! strictly FIFO").

use super::port::Pn532Port;
use super::reader::NfcReader;
use crate::error::MacoError;
use alloc::boxed::Box;
use core::future::Future;
use core::pin::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStep {
    Continue,
    Done,
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// One step of a multi-tick action. `step` is called repeatedly by the
/// reader's tick loop while the tag stays authenticated, until it returns
/// `Done`. `on_abort` is called instead if the tag is lost mid-action.
///
/// `step` receives the full reader, not just the port, so an action can
/// drive the NTAG 424 protocol layer (`nfc::ntag424::protocol`) the same
/// way a direct caller of the reader would.
pub trait NfcAction<P: Pn532Port> {
    fn step<'a>(
        &'a mut self,
        reader: &'a mut NfcReader<P>,
    ) -> BoxFuture<'a, Result<ActionStep, MacoError>>;
    fn on_abort(&mut self, reason: MacoError);
}
