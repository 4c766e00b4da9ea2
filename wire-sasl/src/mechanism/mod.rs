//! Reference engines for the password based mechanisms, enough to run the
//! handshake end to end. Anything fancier (GSSAPI, SCRAM...) is expected to
//! come from an external engine implementing the traits of [`crate::engine`].

pub mod login;
pub mod plain;

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::*;
use crate::types::*;

/// Credential check used by the server engines
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> bool;
}
pub type ArcVerifier = Arc<dyn Verifier>;

// -----------------------------------------------------------------
//
// CLIENT
//
// -----------------------------------------------------------------

/// Picks the first advertised mechanism it supports, in the server order.
pub struct PasswordClient {
    supported: Vec<Mechanism>,
    chosen: Option<Mechanism>,
    username: Option<String>,
    authname: Option<String>,
    password: Option<String>,
    realm: Option<String>,
    suspended: bool,
    login: login::LoginClient,
    events: VecDeque<ClientEvent>,
}

impl PasswordClient {
    pub fn new(supported: Vec<Mechanism>) -> Self {
        Self {
            supported,
            chosen: None,
            username: None,
            authname: None,
            password: None,
            realm: None,
            suspended: false,
            login: login::LoginClient::default(),
            events: VecDeque::new(),
        }
    }

    /// The same name is used for authentication and authorization
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        let user = user.into();
        self.username = Some(user.clone());
        self.authname = Some(user);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn chosen(&self) -> Option<Mechanism> {
        self.chosen
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    fn plain_response(&self) -> Vec<u8> {
        plain::response(
            self.username.as_deref(),
            self.authname.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
        )
    }

    fn proceed(&mut self) {
        let Some(mech) = self.chosen else {
            return;
        };

        if self.authname.is_none() || self.password.is_none() {
            self.suspended = true;
            self.events.push_back(ClientEvent::NeedParams(NeedParams {
                authname: self.authname.is_none(),
                username: self.username.is_none(),
                password: self.password.is_none(),
                realm: false,
            }));
            return;
        }

        let initial_response = match mech {
            Mechanism::Plain => Some(self.plain_response()),
            Mechanism::Login => None,
        };
        self.events.push_back(ClientEvent::FirstStep {
            mechanism: mech.name().to_string(),
            initial_response,
        });
    }
}

impl ClientEngine for PasswordClient {
    fn start(&mut self, service: &str, host: &str, mechanisms: &MechanismList) -> bool {
        self.chosen = mechanisms
            .iter()
            .filter_map(Mechanism::from_name)
            .find(|m| self.supported.contains(m));

        match self.chosen {
            Some(mech) => {
                tracing::debug!(service=%service, host=%host, mechanism=%mech, "Client engine started");
                self.proceed();
                true
            }
            None => {
                tracing::warn!(offered=?mechanisms.0, "No supported mechanism offered");
                false
            }
        }
    }

    fn submit_step(&mut self, payload: &[u8]) {
        let event = match self.chosen {
            // a server without initial response support sends an empty challenge first
            Some(Mechanism::Plain) if payload.is_empty() => {
                ClientEvent::NextStep(self.plain_response())
            }
            Some(Mechanism::Login) => {
                let authname = self.authname.as_deref().unwrap_or_default();
                let password = self.password.as_deref().unwrap_or_default();
                match self.login.step(authname, password) {
                    Some(answer) => ClientEvent::NextStep(answer),
                    None => ClientEvent::Authenticated(false),
                }
            }
            _ => {
                tracing::error!(mechanism=?self.chosen, "Unexpected challenge");
                ClientEvent::Authenticated(false)
            }
        };
        self.events.push_back(event);
    }

    fn set_username(&mut self, username: &str) {
        self.username = Some(username.to_string());
    }

    fn set_authname(&mut self, authname: &str) {
        self.authname = Some(authname.to_string());
    }

    fn set_password(&mut self, password: &str) {
        self.password = Some(password.to_string());
    }

    fn set_realm(&mut self, realm: &str) {
        self.realm = Some(realm.to_string());
    }

    fn resume(&mut self) {
        if self.suspended {
            self.suspended = false;
            self.proceed();
        }
    }

    fn poll_event(&mut self) -> Option<ClientEvent> {
        self.events.pop_front()
    }
}

// -----------------------------------------------------------------
//
// SERVER
//
// -----------------------------------------------------------------

enum Active {
    Plain,
    Login(login::LoginServer),
}

pub struct PasswordServer {
    offered: Vec<Mechanism>,
    verifier: ArcVerifier,
    active: Option<Active>,
    events: VecDeque<ServerEvent>,
}

impl PasswordServer {
    pub fn new(offered: Vec<Mechanism>, verifier: ArcVerifier) -> Self {
        Self {
            offered,
            verifier,
            active: None,
            events: VecDeque::new(),
        }
    }
}

#[async_trait]
impl ServerEngine for PasswordServer {
    fn start(&mut self, service: &str, host: &str, realm: Option<&str>) -> Option<MechanismList> {
        tracing::debug!(service=%service, host=%host, realm=?realm, "Server engine started");
        match self.offered.is_empty() {
            true => None,
            false => Some(MechanismList::from(&self.offered[..])),
        }
    }

    async fn submit_first_step(&mut self, mechanism: &str, initial_response: Option<&[u8]>) {
        let mech = Mechanism::from_name(mechanism).filter(|m| self.offered.contains(m));
        let event = match (mech, initial_response) {
            (None, _) => {
                tracing::error!(mechanism=%mechanism, "Unsupported Authentication Mechanism");
                ServerEvent::Authenticated(false)
            }
            (Some(Mechanism::Plain), Some(data)) => {
                ServerEvent::Authenticated(plain::verify(&*self.verifier, data).await)
            }
            (Some(Mechanism::Plain), None) => {
                self.active = Some(Active::Plain);
                ServerEvent::NextStep(vec![])
            }
            // some clients put the username in the initial response
            (Some(Mechanism::Login), Some(data)) if !data.is_empty() => {
                let mut srv = login::LoginServer::default();
                let event = srv.step(&*self.verifier, data).await;
                self.active = Some(Active::Login(srv));
                event
            }
            (Some(Mechanism::Login), _) => {
                self.active = Some(Active::Login(login::LoginServer::default()));
                ServerEvent::NextStep(login::USERNAME_CHALLENGE.to_vec())
            }
        };
        self.events.push_back(event);
    }

    async fn submit_step(&mut self, payload: &[u8]) {
        let event = match self.active.take() {
            Some(Active::Plain) => {
                ServerEvent::Authenticated(plain::verify(&*self.verifier, payload).await)
            }
            Some(Active::Login(mut srv)) => {
                let event = srv.step(&*self.verifier, payload).await;
                self.active = Some(Active::Login(srv));
                event
            }
            None => {
                tracing::error!("No mechanism in progress");
                ServerEvent::Authenticated(false)
            }
        };
        self.events.push_back(event);
    }

    fn poll_event(&mut self) -> Option<ServerEvent> {
        self.events.pop_front()
    }
}
