use super::Outcome;
use crate::decode;
use crate::engine::{ServerEngine, ServerEvent};
use crate::error::ProtocolError;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Advertise,
    AwaitInitialResponse,
    StepExchange,
    Authenticated,
    Failed,
}

impl ServerPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advertise => "Advertise",
            Self::AwaitInitialResponse => "AwaitInitialResponse",
            Self::StepExchange => "StepExchange",
            Self::Authenticated => "Authenticated",
            Self::Failed => "Failed",
        }
    }

    fn allows(&self, next: ServerPhase) -> bool {
        use ServerPhase::*;
        matches!(
            (self, next),
            (Advertise, AwaitInitialResponse)
                | (Advertise, Failed)
                | (AwaitInitialResponse, StepExchange)
                | (AwaitInitialResponse, Failed)
                | (StepExchange, Authenticated)
                | (StepExchange, Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    Send(ServerFrame),
    /// Last action of the session, close the connection without waiting for the peer
    Close(Outcome),
}

/// Responder side of the handshake.
pub struct ServerSession<E> {
    engine: E,
    phase: ServerPhase,
    service: String,
    host: String,
    realm: Option<String>,
    actions: Vec<ServerAction>,
    done: bool,
}

impl<E: ServerEngine> ServerSession<E> {
    pub fn new(
        engine: E,
        service: impl Into<String>,
        host: impl Into<String>,
        realm: Option<String>,
    ) -> Self {
        Self {
            engine,
            phase: ServerPhase::Advertise,
            service: service.into(),
            host: host.into(),
            realm,
            actions: Vec::new(),
            done: false,
        }
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// First thing to call on a fresh connection
    pub fn advertise(&mut self) -> Vec<ServerAction> {
        if self.done {
            return vec![];
        }
        if self.phase != ServerPhase::Advertise {
            let e = self.unexpected("a second advertisement");
            self.protocol_error(e);
            return self.take_actions();
        }

        match self
            .engine
            .start(&self.service, &self.host, self.realm.as_deref())
        {
            Some(mechanisms) if !mechanisms.is_empty() => {
                tracing::debug!(mechanisms=?mechanisms.0, "Advertising mechanisms");
                match self.enter(ServerPhase::AwaitInitialResponse) {
                    Ok(()) => self
                        .actions
                        .push(ServerAction::Send(ServerFrame::Mechanisms(mechanisms))),
                    Err(e) => self.protocol_error(e),
                }
            }
            _ => {
                tracing::error!("Engine has no mechanism to offer");
                self.finish(Outcome::Failed);
            }
        }
        self.take_actions()
    }

    /// A received step is fully handed over to the engine before this returns
    pub async fn receive_line(&mut self, line: &[u8]) -> Vec<ServerAction> {
        if self.done {
            tracing::debug!("Handshake is over, ignoring line");
            return vec![];
        }

        tracing::trace!(line=%String::from_utf8_lossy(line), "Received line");
        if let Err(e) = self.handle_line(line).await {
            self.protocol_error(e);
        }
        self.take_actions()
    }

    /// Ends the session with the given outcome unless it is already over
    pub fn abort(&mut self, outcome: Outcome) -> Vec<ServerAction> {
        self.finish(outcome);
        self.take_actions()
    }

    pub fn disconnected(&mut self) -> Vec<ServerAction> {
        self.abort(Outcome::TransportError(
            "connection closed by peer".to_string(),
        ))
    }

    // ---- wire events

    async fn handle_line(&mut self, line: &[u8]) -> Result<(), ProtocolError> {
        match self.phase {
            ServerPhase::AwaitInitialResponse => match decode::first_step(line)? {
                ClientFrame::FirstStep {
                    mechanism,
                    initial_response,
                } => {
                    tracing::info!(mechanism=%mechanism, initial_response=initial_response.is_some(), "Client chose its mechanism");
                    self.enter(ServerPhase::StepExchange)?;
                    self.engine
                        .submit_first_step(&mechanism, initial_response.as_deref())
                        .await;
                    self.drain_engine()
                }
                ClientFrame::Step(_) => Err(self.unexpected("a step")),
            },
            ServerPhase::StepExchange => match decode::client_frame(line)? {
                ClientFrame::Step(payload) => {
                    self.engine.submit_step(&payload).await;
                    self.drain_engine()
                }
                ClientFrame::FirstStep { .. } => Err(self.unexpected("a first step")),
            },
            ServerPhase::Advertise | ServerPhase::Authenticated | ServerPhase::Failed => {
                Err(self.unexpected("a line"))
            }
        }
    }

    // ---- engine events

    fn drain_engine(&mut self) -> Result<(), ProtocolError> {
        while !self.done {
            let Some(event) = self.engine.poll_event() else {
                break;
            };
            match event {
                ServerEvent::NextStep(payload) => self.on_next_step(payload)?,
                ServerEvent::Authenticated(ok) => self.on_authenticated(ok),
            }
        }
        Ok(())
    }

    fn on_next_step(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError> {
        if self.phase != ServerPhase::StepExchange {
            return Err(self.unexpected("a step from the engine"));
        }
        self.actions
            .push(ServerAction::Send(ServerFrame::Step(payload)));
        Ok(())
    }

    fn on_authenticated(&mut self, ok: bool) {
        let (frame, outcome) = match ok {
            true => (ServerFrame::Success, Outcome::Authenticated),
            false => (ServerFrame::Failure, Outcome::Failed),
        };
        self.actions.push(ServerAction::Send(frame));
        self.finish(outcome);
    }

    // ---- state

    fn enter(&mut self, next: ServerPhase) -> Result<(), ProtocolError> {
        if !self.phase.allows(next) {
            return Err(ProtocolError::IllegalTransition {
                from: self.phase.name(),
                to: next.name(),
            });
        }
        tracing::debug!(from=%self.phase.name(), to=%next.name(), "Server phase change");
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
            Outcome::Authenticated => ServerPhase::Authenticated,
            _ => ServerPhase::Failed,
        };
        let outcome = match self.enter(target) {
            Ok(()) => outcome,
            Err(e) => {
                // never announce a verdict we could not reach
                self.actions.retain(|a| {
                    !matches!(a, ServerAction::Send(ServerFrame::Success))
                });
                self.phase = ServerPhase::Failed;
                Outcome::ProtocolError(e)
            }
        };
        tracing::info!(outcome=%outcome, "Server handshake is over");
        self.done = true;
        self.actions.push(ServerAction::Close(outcome));
    }

    fn take_actions(&mut self) -> Vec<ServerAction> {
        std::mem::take(&mut self.actions)
    }
}
