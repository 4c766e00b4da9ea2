//! A line oriented SASL handshake protocol.
//!
//! The server speaks first and advertises the mechanisms its engine supports,
//! the client answers with its choice and an optional initial response, then
//! both sides exchange opaque steps until the server announces its verdict.
//!
//! ## Trace
//!
//! ```text
//! S: PLAIN LOGIN
//! C: LOGIN
//! S: C,VXNlcm5hbWU6
//! C: C,YWxpY2U=
//! S: C,UGFzc3dvcmQ6
//! C: C,aHVudGVyMg==
//! S: A
//! ```
//!
//! Every payload is base64 encoded, an empty payload is sent as a bare `C`.
//! `A` (success) and `E` (failure) are only sent by the server, which closes
//! the connection right after.
//!
//! ## RFC References
//!
//! SASL - https://datatracker.ietf.org/doc/html/rfc4422
//! PLAIN SASL - https://datatracker.ietf.org/doc/html/rfc4616

pub mod decode;
pub mod encode;
pub mod engine;
pub mod error;
pub mod flow;
pub mod mechanism;
pub mod types;

pub use error::ProtocolError;
pub use flow::Outcome;
