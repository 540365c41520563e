//! Challenge/response hook

use serde::Serialize;

/// Answers an authentication challenge issued by a client
///
/// Returning `None` declines the challenge.
pub trait ChallengeResponder {
    fn respond(&mut self, challenge: &[u8]) -> Option<Vec<u8>>;
}

/// Responder that never answers
#[derive(Debug, Clone, Copy, Default)]
pub struct DecliningResponder;

impl ChallengeResponder for DecliningResponder {
    fn respond(&mut self, _challenge: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

impl<F> ChallengeResponder for F
where
    F: FnMut(&[u8]) -> Option<Vec<u8>>,
{
    fn respond(&mut self, challenge: &[u8]) -> Option<Vec<u8>> {
        self(challenge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No responder answered; the link works unauthenticated
    #[default]
    Unsupported,
    Pending,
    Authenticated,
    /// Profile requires authentication and the challenge was declined
    Failed,
}
