use std::collections::VecDeque;

use super::Outcome;
use crate::decode;
use crate::engine::{ClientEngine, ClientEvent, NeedParams, Params};
use crate::error::ProtocolError;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    AwaitMechanismList,
    StepExchange,
    Authenticated,
    Failed,
}

impl ClientPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitMechanismList => "AwaitMechanismList",
            Self::StepExchange => "StepExchange",
            Self::Authenticated => "Authenticated",
            Self::Failed => "Failed",
        }
    }

    fn allows(&self, next: ClientPhase) -> bool {
        use ClientPhase::*;
        matches!(
            (self, next),
            (AwaitMechanismList, StepExchange)
                | (AwaitMechanismList, Failed)
                | (StepExchange, Authenticated)
                | (StepExchange, Failed)
        )
    }
}

/// What the caller must do on behalf of the session, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    Send(ClientFrame),
    /// Call [`ClientSession::supply_params`], lines received meanwhile are queued
    NeedParams(NeedParams),
    /// Last action of the session, close the connection
    Done(Outcome),
}

/// Initiator side of the handshake. The server speaks first: the session
/// does nothing until the mechanism list is received.
pub struct ClientSession<E> {
    engine: E,
    phase: ClientPhase,
    service: String,
    host: String,
    first_step_sent: bool,
    suspended: bool,
    backlog: VecDeque<Vec<u8>>,
    actions: Vec<ClientAction>,
    done: bool,
}

impl<E: ClientEngine> ClientSession<E> {
    pub fn new(engine: E, service: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            engine,
            phase: ClientPhase::AwaitMechanismList,
            service: service.into(),
            host: host.into(),
            first_step_sent: false,
            suspended: false,
            backlog: VecDeque::new(),
            actions: Vec::new(),
            done: false,
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn receive_line(&mut self, line: &[u8]) -> Vec<ClientAction> {
        if self.done {
            tracing::debug!("Handshake is over, ignoring line");
            return vec![];
        }
        if self.suspended {
            tracing::trace!("Waiting for parameters, line queued");
            self.backlog.push_back(line.to_vec());
            return vec![];
        }

        self.handle_line(line);
        self.take_actions()
    }

    pub fn supply_params(&mut self, params: Params) -> Vec<ClientAction> {
        if self.done || !self.suspended {
            tracing::warn!("Parameters supplied while none were requested, ignoring them");
            return vec![];
        }

        if let Some(username) = &params.username {
            self.engine.set_username(username);
        }
        if let Some(authname) = &params.authname {
            self.engine.set_authname(authname);
        }
        if let Some(password) = &params.password {
            self.engine.set_password(password);
        }
        if let Some(realm) = &params.realm {
            self.engine.set_realm(realm);
        }
        self.suspended = false;
        self.engine.resume();

        if let Err(e) = self.drain_engine() {
            self.protocol_error(e);
        }
        while !self.done && !self.suspended {
            match self.backlog.pop_front() {
                Some(line) => self.handle_line(&line),
                None => break,
            }
        }

        self.take_actions()
    }

    /// Ends the session with the given outcome unless it is already over
    pub fn abort(&mut self, outcome: Outcome) -> Vec<ClientAction> {
        self.finish(outcome);
        self.take_actions()
    }

    pub fn disconnected(&mut self) -> Vec<ClientAction> {
        self.abort(Outcome::TransportError(
            "connection closed by peer".to_string(),
        ))
    }

    // ---- wire events

    fn handle_line(&mut self, line: &[u8]) {
        tracing::trace!(line=%String::from_utf8_lossy(line), "Received line");
        let res = match self.phase {
            ClientPhase::AwaitMechanismList => {
                decode::mechanism_list(line).and_then(|list| self.on_mechanism_list(list))
            }
            ClientPhase::StepExchange => {
                decode::server_frame(line).and_then(|frame| self.on_server_frame(frame))
            }
            ClientPhase::Authenticated | ClientPhase::Failed => {
                Err(self.unexpected("a line after the verdict"))
            }
        };
        if let Err(e) = res {
            self.protocol_error(e);
        }
    }

    fn on_mechanism_list(&mut self, mechanisms: MechanismList) -> Result<(), ProtocolError> {
        tracing::debug!(mechanisms=?mechanisms.0, "Server advertised its mechanisms");
        if !self
            .engine
            .start(&self.service, &self.host, &mechanisms)
        {
            tracing::warn!("Unable to negotiate any of the advertised mechanisms");
            self.finish(Outcome::Failed);
            return Ok(());
        }

        self.enter(ClientPhase::StepExchange)?;
        self.drain_engine()
    }

    fn on_server_frame(&mut self, frame: ServerFrame) -> Result<(), ProtocolError> {
        match frame {
            ServerFrame::Step(payload) => {
                self.engine.submit_step(&payload);
                self.drain_engine()
            }
            ServerFrame::Success => {
                self.finish(Outcome::Authenticated);
                Ok(())
            }
            ServerFrame::Failure => {
                self.finish(Outcome::Failed);
                Ok(())
            }
            ServerFrame::Mechanisms(_) => Err(self.unexpected("a mechanism list")),
        }
    }

    // ---- engine events

    fn drain_engine(&mut self) -> Result<(), ProtocolError> {
        while !self.done && !self.suspended {
            let Some(event) = self.engine.poll_event() else {
                break;
            };
            match event {
                ClientEvent::FirstStep {
                    mechanism,
                    initial_response,
                } => self.on_first_step(mechanism, initial_response)?,
                ClientEvent::NextStep(payload) => self.on_next_step(payload)?,
                ClientEvent::NeedParams(need) => self.on_need_params(need),
                ClientEvent::Authenticated(ok) => self.on_authenticated(ok),
            }
        }
        Ok(())
    }

    fn on_first_step(
        &mut self,
        mechanism: String,
        initial_response: Option<Vec<u8>>,
    ) -> Result<(), ProtocolError> {
        if self.phase != ClientPhase::StepExchange || self.first_step_sent {
            return Err(self.unexpected("a first step from the engine"));
        }
        tracing::info!(mechanism=%mechanism, "Mechanism chosen");
        self.first_step_sent = true;
        self.actions.push(ClientAction::Send(ClientFrame::FirstStep {
            mechanism,
            initial_response,
        }));
        Ok(())
    }

    fn on_next_step(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError> {
        if !self.first_step_sent {
            return Err(self.unexpected("a step before the first step"));
        }
        self.actions
            .push(ClientAction::Send(ClientFrame::Step(payload)));
        Ok(())
    }

    fn on_need_params(&mut self, need: NeedParams) {
        tracing::debug!(need=?need, "Engine needs parameters");
        self.suspended = true;
        self.actions.push(ClientAction::NeedParams(need));
    }

    fn on_authenticated(&mut self, ok: bool) {
        match ok {
            // the server verdict is the one that counts
            true => tracing::debug!("Engine is satisfied, waiting for the server verdict"),
            false => self.finish(Outcome::Failed),
        }
    }

    // ---- state

    fn enter(&mut self, next: ClientPhase) -> Result<(), ProtocolError> {
        if !self.phase.allows(next) {
            return Err(ProtocolError::IllegalTransition {
                from: self.phase.name(),
                to: next.name(),
            });
        }
        tracing::debug!(from=%self.phase.name(), to=%next.name(), "Client phase change");
        self.phase = next;
        Ok(())
    }

    fn unexpected(&self, what: &str) -> ProtocolError {
        ProtocolError::Unexpected {
            phase: self.phase.name(),
            what: what.to_string(),
        }
    }

    fn protocol_error(&mut self, e: ProtocolError) {
        tracing::error!(err=%e, "Protocol error, closing");
        self.finish(Outcome::ProtocolError(e));
    }

    fn finish(&mut self, outcome: Outcome) {
        if self.done {
            return;
        }
        let target = match outcome {
            Outcome::Authenticated => ClientPhase::Authenticated,
            _ => ClientPhase::Failed,
        };
        let outcome = match self.enter(target) {
            Ok(()) => outcome,
            Err(e) => {
                self.phase = ClientPhase::Failed;
                Outcome::ProtocolError(e)
            }
        };
        tracing::info!(outcome=%outcome, "Client handshake is over");
        self.done = true;
        self.backlog.clear();
        self.actions.push(ClientAction::Done(outcome));
    }

    fn take_actions(&mut self) -> Vec<ClientAction> {
        std::mem::take(&mut self.actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays canned events, records what it was given
    #[derive(Default)]
    struct Scripted {
        refuse: bool,
        on_start: Vec<ClientEvent>,
        on_resume: Vec<ClientEvent>,
        on_step: VecDeque<Vec<ClientEvent>>,
        started_with: Option<(String, String, MechanismList)>,
        steps: Vec<Vec<u8>>,
        params: Params,
        events: VecDeque<ClientEvent>,
    }

    impl ClientEngine for Scripted {
        fn start(&mut self, service: &str, host: &str, mechanisms: &MechanismList) -> bool {
            self.started_with = Some((service.into(), host.into(), mechanisms.clone()));
            self.events.extend(self.on_start.drain(..));
            !self.refuse
        }
        fn submit_step(&mut self, payload: &[u8]) {
            self.steps.push(payload.to_vec());
            if let Some(evts) = self.on_step.pop_front() {
                self.events.extend(evts);
            }
        }
        fn set_username(&mut self, username: &str) {
            self.params.username = Some(username.into());
        }
        fn set_authname(&mut self, authname: &str) {
            self.params.authname = Some(authname.into());
        }
        fn set_password(&mut self, password: &str) {
            self.params.password = Some(password.into());
        }
        fn set_realm(&mut self, realm: &str) {
            self.params.realm = Some(realm.into());
        }
        fn resume(&mut self) {
            self.events.extend(self.on_resume.drain(..));
        }
        fn poll_event(&mut self) -> Option<ClientEvent> {
            self.events.pop_front()
        }
    }

    fn plain_first_step() -> ClientEvent {
        ClientEvent::FirstStep {
            mechanism: "PLAIN".into(),
            initial_response: Some(b"\x00user\x00pass".to_vec()),
        }
    }

    fn session(engine: Scripted) -> ClientSession<Scripted> {
        ClientSession::new(engine, "foo", "example.tld")
    }

    #[test]
    fn plain_handshake_succeeds_on_a() {
        let mut s = session(Scripted {
            on_start: vec![plain_first_step()],
            ..Default::default()
        });

        let actions = s.receive_line(b"PLAIN DIGEST-MD5");
        let (service, host, list) = s.engine().started_with.clone().unwrap();
        assert_eq!(service, "foo");
        assert_eq!(host, "example.tld");
        assert_eq!(list.0, vec!["PLAIN".to_string(), "DIGEST-MD5".to_string()]);
        assert_eq!(
            actions,
            vec![ClientAction::Send(ClientFrame::FirstStep {
                mechanism: "PLAIN".into(),
                initial_response: Some(b"\x00user\x00pass".to_vec()),
            })]
        );
        assert_eq!(s.phase(), ClientPhase::StepExchange);

        let actions = s.receive_line(b"A");
        assert_eq!(actions, vec![ClientAction::Done(Outcome::Authenticated)]);
        assert_eq!(s.phase(), ClientPhase::Authenticated);

        // terminal, nothing else happens
        assert!(s.receive_line(b"C").is_empty());
        assert!(s.disconnected().is_empty());
    }

    #[test]
    fn e_means_failed() {
        let mut s = session(Scripted {
            on_start: vec![plain_first_step()],
            ..Default::default()
        });
        s.receive_line(b"PLAIN");
        assert_eq!(
            s.receive_line(b"E"),
            vec![ClientAction::Done(Outcome::Failed)]
        );
        assert_eq!(s.phase(), ClientPhase::Failed);
    }

    #[test]
    fn empty_mechanism_list_is_a_protocol_error() {
        let mut s = session(Scripted::default());
        assert_eq!(
            s.receive_line(b""),
            vec![ClientAction::Done(Outcome::ProtocolError(
                ProtocolError::EmptyMechanismList
            ))]
        );
        assert!(s.engine().started_with.is_none());
        assert_eq!(s.phase(), ClientPhase::Failed);
    }

    #[test]
    fn engine_refusal_fails_without_sending() {
        let mut s = session(Scripted {
            refuse: true,
            ..Default::default()
        });
        assert_eq!(
            s.receive_line(b"GSSAPI"),
            vec![ClientAction::Done(Outcome::Failed)]
        );
    }

    #[test]
    fn steps_are_forwarded_both_ways() {
        let mut s = session(Scripted {
            on_start: vec![ClientEvent::FirstStep {
                mechanism: "LOGIN".into(),
                initial_response: None,
            }],
            on_step: VecDeque::from(vec![
                vec![ClientEvent::NextStep(b"alice".to_vec())],
                vec![ClientEvent::NextStep(vec![])],
            ]),
            ..Default::default()
        });
        s.receive_line(b"LOGIN");

        let actions = s.receive_line(b"C,VXNlcm5hbWU6");
        assert_eq!(
            actions,
            vec![ClientAction::Send(ClientFrame::Step(b"alice".to_vec()))]
        );
        let actions = s.receive_line(b"C");
        assert_eq!(actions, vec![ClientAction::Send(ClientFrame::Step(vec![]))]);
        assert_eq!(s.engine().steps, vec![b"Username:".to_vec(), vec![]]);
    }

    #[test]
    fn unknown_tag_is_a_protocol_error() {
        let mut s = session(Scripted {
            on_start: vec![plain_first_step()],
            ..Default::default()
        });
        s.receive_line(b"PLAIN");
        let actions = s.receive_line(b"Z,abc");
        assert!(matches!(
            actions.as_slice(),
            [ClientAction::Done(Outcome::ProtocolError(ProtocolError::Malformed(_)))]
        ));
    }

    #[test]
    fn lines_are_queued_while_parameters_are_pending() {
        let need = NeedParams {
            authname: true,
            username: true,
            password: true,
            realm: false,
        };
        let mut s = session(Scripted {
            on_start: vec![ClientEvent::NeedParams(need)],
            on_resume: vec![ClientEvent::FirstStep {
                mechanism: "LOGIN".into(),
                initial_response: None,
            }],
            on_step: VecDeque::from(vec![vec![ClientEvent::NextStep(b"alice".to_vec())]]),
            ..Default::default()
        });

        assert_eq!(
            s.receive_line(b"LOGIN"),
            vec![ClientAction::NeedParams(need)]
        );
        // the peer is not supposed to speak here, but nothing is lost if it does
        assert!(s.receive_line(b"C,VXNlcm5hbWU6").is_empty());
        assert!(s.engine().steps.is_empty());

        let actions = s.supply_params(Params {
            username: Some("alice".into()),
            authname: Some("alice".into()),
            password: Some("hunter2".into()),
            realm: None,
        });
        assert_eq!(
            actions,
            vec![
                ClientAction::Send(ClientFrame::FirstStep {
                    mechanism: "LOGIN".into(),
                    initial_response: None,
                }),
                ClientAction::Send(ClientFrame::Step(b"alice".to_vec())),
            ]
        );
        assert_eq!(s.engine().params.password.as_deref(), Some("hunter2"));
        assert_eq!(s.engine().params.realm, None);
        assert_eq!(s.engine().steps, vec![b"Username:".to_vec()]);
    }

    #[test]
    fn unrequested_params_are_ignored() {
        let mut s = session(Scripted::default());
        assert!(s.supply_params(Params::default()).is_empty());
        assert!(s.engine().params.username.is_none());
    }

    #[test]
    fn engine_reported_failure_ends_the_session() {
        let mut s = session(Scripted {
            on_start: vec![plain_first_step()],
            on_step: VecDeque::from(vec![vec![ClientEvent::Authenticated(false)]]),
            ..Default::default()
        });
        s.receive_line(b"PLAIN");
        assert_eq!(
            s.receive_line(b"C,AA=="),
            vec![ClientAction::Done(Outcome::Failed)]
        );
    }

    #[test]
    fn engine_reported_success_still_waits_for_the_verdict() {
        let mut s = session(Scripted {
            on_start: vec![plain_first_step()],
            on_step: VecDeque::from(vec![vec![ClientEvent::Authenticated(true)]]),
            ..Default::default()
        });
        s.receive_line(b"PLAIN");
        assert!(s.receive_line(b"C").is_empty());
        assert_eq!(s.phase(), ClientPhase::StepExchange);
        assert_eq!(
            s.receive_line(b"A"),
            vec![ClientAction::Done(Outcome::Authenticated)]
        );
    }

    #[test]
    fn verdict_with_trailer_acts_on_its_tag() {
        for (line, outcome) in [
            (&b"A,"[..], Outcome::Authenticated),
            (&b"A,xyz"[..], Outcome::Authenticated),
            (&b"E,"[..], Outcome::Failed),
            (&b"E,reason"[..], Outcome::Failed),
        ] {
            let mut s = session(Scripted {
                on_start: vec![plain_first_step()],
                ..Default::default()
            });
            s.receive_line(b"PLAIN");
            assert_eq!(s.receive_line(line), vec![ClientAction::Done(outcome)]);
            assert!(s.is_done());
        }
    }

    #[test]
    fn disconnect_before_verdict_is_a_transport_error() {
        let mut s = session(Scripted {
            on_start: vec![plain_first_step()],
            ..Default::default()
        });
        s.receive_line(b"PLAIN");
        let actions = s.disconnected();
        assert!(matches!(
            actions.as_slice(),
            [ClientAction::Done(Outcome::TransportError(_))]
        ));
        assert_eq!(s.phase(), ClientPhase::Failed);
        assert!(s.disconnected().is_empty());
    }

    #[test]
    fn engine_emitting_two_first_steps_is_rejected() {
        let mut s = session(Scripted {
            on_start: vec![plain_first_step(), plain_first_step()],
            ..Default::default()
        });
        let actions = s.receive_line(b"PLAIN");
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            actions[1],
            ClientAction::Done(Outcome::ProtocolError(ProtocolError::Unexpected { .. }))
        ));
    }

    #[test]
    fn verdict_phases_can_not_be_left() {
        assert!(!ClientPhase::Authenticated.allows(ClientPhase::StepExchange));
        assert!(!ClientPhase::Failed.allows(ClientPhase::Authenticated));
        assert!(!ClientPhase::AwaitMechanismList.allows(ClientPhase::Authenticated));
    }
}
