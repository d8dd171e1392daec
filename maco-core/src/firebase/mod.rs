mod client;
pub mod types;

pub use client::{
    AuthenticateTagOutcome, CompleteTagAuthOutcome, FirebaseClient, Forward, ForwardResponse,
    PersonalizeKeys, TerminalCheckinOutcome,
};

#[cfg(test)]
pub mod test_support;
