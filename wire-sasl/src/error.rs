use thiserror::Error;

/// Framing errors. The side detecting one closes the connection
/// without sending a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unable to parse line {0:?}")]
    Malformed(String),
    #[error("the server advertised no mechanism")]
    EmptyMechanismList,
    #[error("payload is not valid base64")]
    InvalidBase64,
    #[error("{what} is not valid while in phase {phase}")]
    Unexpected { phase: &'static str, what: String },
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("line is longer than {0} bytes")]
    LineTooLong(usize),
}
