//! The negotiation engine is an external collaborator: it picks a mechanism,
//! computes or checks the mechanism specific payloads and reports its progress
//! through events. The handshake sessions in [`crate::flow`] are the only
//! consumers of these events, they poll them after every call into the engine.

use async_trait::async_trait;

use crate::types::MechanismList;

/// Which parameters the client engine is missing before it can go on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeedParams {
    pub authname: bool,
    pub username: bool,
    pub password: bool,
    pub realm: bool,
}

/// Answer to a [`NeedParams`] request, only the requested fields are read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pub username: Option<String>,
    pub authname: Option<String>,
    pub password: Option<String>,
    pub realm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Emitted once, after a successful `start` (possibly after parameters were supplied)
    FirstStep {
        mechanism: String,
        initial_response: Option<Vec<u8>>,
    },
    NextStep(Vec<u8>),
    /// The engine is suspended until `resume` is called
    NeedParams(NeedParams),
    Authenticated(bool),
}

pub trait ClientEngine {
    /// Returns false when no advertised mechanism can be negotiated
    fn start(&mut self, service: &str, host: &str, mechanisms: &MechanismList) -> bool;
    fn submit_step(&mut self, payload: &[u8]);

    fn set_username(&mut self, username: &str);
    fn set_authname(&mut self, authname: &str);
    fn set_password(&mut self, password: &str);
    fn set_realm(&mut self, realm: &str);
    fn resume(&mut self);

    fn poll_event(&mut self) -> Option<ClientEvent>;
}

impl<T: ClientEngine + ?Sized> ClientEngine for Box<T> {
    fn start(&mut self, service: &str, host: &str, mechanisms: &MechanismList) -> bool {
        (**self).start(service, host, mechanisms)
    }
    fn submit_step(&mut self, payload: &[u8]) {
        (**self).submit_step(payload)
    }
    fn set_username(&mut self, username: &str) {
        (**self).set_username(username)
    }
    fn set_authname(&mut self, authname: &str) {
        (**self).set_authname(authname)
    }
    fn set_password(&mut self, password: &str) {
        (**self).set_password(password)
    }
    fn set_realm(&mut self, realm: &str) {
        (**self).set_realm(realm)
    }
    fn resume(&mut self) {
        (**self).resume()
    }
    fn poll_event(&mut self) -> Option<ClientEvent> {
        (**self).poll_event()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    NextStep(Vec<u8>),
    Authenticated(bool),
}

/// Server side steps are async as checking credentials usually means
/// talking to a user database.
#[async_trait]
pub trait ServerEngine: Send {
    /// Returns the mechanisms to advertise, None when the engine can not serve this session
    fn start(&mut self, service: &str, host: &str, realm: Option<&str>) -> Option<MechanismList>;
    async fn submit_first_step(&mut self, mechanism: &str, initial_response: Option<&[u8]>);
    async fn submit_step(&mut self, payload: &[u8]);

    fn poll_event(&mut self) -> Option<ServerEvent>;
}

#[async_trait]
impl<T: ServerEngine + ?Sized> ServerEngine for Box<T> {
    fn start(&mut self, service: &str, host: &str, realm: Option<&str>) -> Option<MechanismList> {
        (**self).start(service, host, realm)
    }
    async fn submit_first_step(&mut self, mechanism: &str, initial_response: Option<&[u8]>) {
        (**self).submit_first_step(mechanism, initial_response).await
    }
    async fn submit_step(&mut self, payload: &[u8]) {
        (**self).submit_step(payload).await
    }
    fn poll_event(&mut self) -> Option<ServerEvent> {
        (**self).poll_event()
    }
}
