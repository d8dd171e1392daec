use super::client::{Forward, ForwardResponse};
use crate::error::MacoError;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

#[derive(Debug, Clone)]
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

    pub fn failure(endpoint: &'static str, status: u16, error: &str) -> Self {
        Self {
            endpoint,
            status,
            body: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Replays scripted responses in order, recording every endpoint it was
/// called with so tests can assert on call counts (spec scenarios B/C:
/// "the cloud mock records zero calls").
#[derive(Default)]
pub struct MockFirebaseTransport {
    script: RefCell<VecDeque<ScriptedResponse>>,
    calls: RefCell<Vec<String>>,
}

impl MockFirebaseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ScriptedResponse) -> &Self {
        self.script.borrow_mut().push_back(response);
        self
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls.borrow().iter().filter(|e| e == endpoint).count()
    }
}

impl Forward for MockFirebaseTransport {
    async fn forward(&self, endpoint: &str, _payload: &[u8]) -> Result<ForwardResponse, MacoError> {
        self.calls.borrow_mut().push(endpoint.into());
        let next = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("mock firebase transport script exhausted for {endpoint}"));
        assert_eq!(
            next.endpoint, endpoint,
            "mock firebase transport expected a call to {}, got {}",
            next.endpoint, endpoint
        );
        Ok(ForwardResponse {
            status: next.status,
            body: next.body,
            error: next.error,
        })
    }
}
