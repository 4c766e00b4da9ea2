pub mod client;
pub mod server;
pub mod transport;
pub mod verifier;
