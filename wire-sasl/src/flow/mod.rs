pub mod client;
pub mod server;

use std::fmt;

use crate::error::ProtocolError;

/// How a handshake session ended, reported exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Authenticated,
    /// The engine refused the peer, this is not an error
    Failed,
    ProtocolError(ProtocolError),
    TransportError(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl From<ProtocolError> for Outcome {
    fn from(e: ProtocolError) -> Self {
        Self::ProtocolError(e)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated => write!(f, "authentication succeeded"),
            Self::Failed => write!(f, "authentication failed"),
            Self::ProtocolError(e) => write!(f, "protocol error: {}", e),
            Self::TransportError(e) => write!(f, "transport error: {}", e),
        }
    }
}
