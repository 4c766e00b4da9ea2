use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use wire_sasl::engine::ServerEngine;
use wire_sasl::flow::server::{ServerAction, ServerSession};
use wire_sasl::Outcome;

use crate::transport::LineTransport;

/// Builds the engine of each new session
pub type EngineBuilder = Arc<dyn Fn() -> Box<dyn ServerEngine> + Send + Sync>;

/// What every session is started with
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub service: String,
    pub hostname: String,
    pub realm: Option<String>,
}

/// Serves one handshake at a time: a connection arriving while a session
/// is running is closed right away.
pub struct AuthServer {
    bind_addr: SocketAddr,
    settings: SessionSettings,
    engines: EngineBuilder,
    outcomes: Option<mpsc::UnboundedSender<Outcome>>,
}

impl AuthServer {
    pub fn new(bind_addr: SocketAddr, settings: SessionSettings, engines: EngineBuilder) -> Self {
        Self {
            bind_addr,
            settings,
            engines,
            outcomes: None,
        }
    }

    /// Every session outcome is also sent on this channel
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<Outcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    pub async fn run(self, must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("unable to bind {}", self.bind_addr))?;
        self.serve(tcp, must_exit).await
    }

    pub async fn serve(self, tcp: TcpListener, mut must_exit: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            service=%self.settings.service,
            "SASL handshake server listening on {:#}",
            tcp.local_addr()?
        );

        let mut active: Option<JoinHandle<()>> = None;

        while !*must_exit.borrow() {
            let (socket, remote_addr) = tokio::select! {
                a = tcp.accept() => a?,
                c = must_exit.changed() => match c {
                    Ok(()) => continue,
                    Err(_) => break,
                },
            };

            if active.as_ref().is_some_and(|h| !h.is_finished()) {
                tracing::warn!("AUTH: refused connection from {}, a session is already running", remote_addr);
                drop(socket);
                continue;
            }

            tracing::info!("AUTH: accepted connection from {}", remote_addr);
            let session = ServerSession::new(
                (self.engines)(),
                self.settings.service.clone(),
                self.settings.hostname.clone(),
                self.settings.realm.clone(),
            );
            let conn = NetLoop::new(socket, session, must_exit.clone(), self.outcomes.clone());
            active = Some(tokio::spawn(conn.run_error()));
        }
        drop(tcp);

        tracing::info!("AUTH server shutting down, draining the running session...");
        if let Some(handle) = active {
            if let Err(e) = handle.await {
                tracing::error!(err=?e, "Session task did not complete");
            }
        }

        Ok(())
    }
}

struct NetLoop {
    transport: LineTransport<TcpStream>,
    session: ServerSession<Box<dyn ServerEngine>>,
    stop: watch::Receiver<bool>,
    outcomes: Option<mpsc::UnboundedSender<Outcome>>,
}

impl NetLoop {
    fn new(
        stream: TcpStream,
        session: ServerSession<Box<dyn ServerEngine>>,
        stop: watch::Receiver<bool>,
        outcomes: Option<mpsc::UnboundedSender<Outcome>>,
    ) -> Self {
        Self {
            transport: LineTransport::new(stream),
            session,
            stop,
            outcomes,
        }
    }

    async fn run_error(self) {
        let outcomes = self.outcomes.clone();
        let outcome = self.run().await;
        match &outcome {
            Outcome::Authenticated => tracing::info!("Auth session succeeded"),
            Outcome::Failed => tracing::info!("Auth session refused the client"),
            e => tracing::error!(outcome=%e, "Auth session failed"),
        }
        if let Some(tx) = outcomes {
            // nobody listening anymore is fine
            let _ = tx.send(outcome);
        }
    }

    async fn run(mut self) -> Outcome {
        let actions = self.session.advertise();
        if let Some(outcome) = self.apply(actions).await {
            return outcome;
        }

        loop {
            let actions = tokio::select! {
                line = self.transport.read_line() => match line {
                    Ok(Some(line)) => self.session.receive_line(&line).await,
                    Ok(None) => {
                        tracing::info!("Connection has been closed before the verdict");
                        self.session.disconnected()
                    }
                    Err(e) => self.session.abort(e.into()),
                },
                _ = self.stop.changed() => {
                    tracing::debug!("Server is stopping, quitting this runner");
                    self.session.abort(Outcome::TransportError("server is shutting down".to_string()))
                }
            };

            if let Some(outcome) = self.apply(actions).await {
                return outcome;
            }
        }
    }

    async fn apply(&mut self, actions: Vec<ServerAction>) -> Option<Outcome> {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                ServerAction::Send(frame) => {
                    if let Err(e) = self.transport.send(&frame).await {
                        tracing::error!(err=%e, "Unable to send frame");
                        queue.extend(self.session.abort(e.into()));
                    }
                }
                ServerAction::Close(outcome) => {
                    if let Err(e) = self.transport.shutdown().await {
                        tracing::debug!(err=%e, "Unable to shutdown the connection");
                    }
                    return Some(outcome);
                }
            }
        }
        None
    }
}
