use std::collections::VecDeque;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::ToSocketAddrs;
use tokio::runtime::{Handle, RuntimeFlavor};

use wire_sasl::engine::{ClientEngine, NeedParams, Params};
use wire_sasl::flow::client::{ClientAction, ClientSession};
use wire_sasl::Outcome;

use crate::transport::LineTransport;

/// Answers the engine when it lacks parameters, typically by asking a human.
pub trait ParamsProvider {
    fn provide(&mut self, need: NeedParams) -> Result<Params>;
}

/// Fixed answers, missing fields stay missing
impl ParamsProvider for Params {
    fn provide(&mut self, _need: NeedParams) -> Result<Params> {
        Ok(self.clone())
    }
}

/// Connects to `addr` then runs the whole handshake.
/// `host` is the server name handed to the engine.
pub async fn authenticate<A, E, P>(
    addr: A,
    service: &str,
    host: &str,
    engine: E,
    params: &mut P,
) -> Outcome
where
    A: ToSocketAddrs,
    E: ClientEngine,
    P: ParamsProvider,
{
    let transport = match LineTransport::connect(addr).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(err=%e, "Unable to reach the server");
            return e.into();
        }
    };
    run(transport, ClientSession::new(engine, service, host), params).await
}

/// Drives a client session until its outcome is known
pub async fn run<S, E, P>(
    mut transport: LineTransport<S>,
    mut session: ClientSession<E>,
    params: &mut P,
) -> Outcome
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: ClientEngine,
    P: ParamsProvider,
{
    loop {
        let actions = match transport.read_line().await {
            Ok(Some(line)) => session.receive_line(&line),
            Ok(None) => session.disconnected(),
            Err(e) => session.abort(e.into()),
        };

        if let Some(outcome) = apply(&mut transport, &mut session, params, actions).await {
            if let Err(e) = transport.shutdown().await {
                tracing::debug!(err=%e, "Unable to shutdown the connection");
            }
            return outcome;
        }
    }
}

async fn apply<S, E, P>(
    transport: &mut LineTransport<S>,
    session: &mut ClientSession<E>,
    params: &mut P,
    actions: Vec<ClientAction>,
) -> Option<Outcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: ClientEngine,
    P: ParamsProvider,
{
    let mut queue = VecDeque::from(actions);
    while let Some(action) = queue.pop_front() {
        match action {
            ClientAction::Send(frame) => {
                if let Err(e) = transport.send(&frame).await {
                    tracing::error!(err=%e, "Unable to send frame");
                    queue.extend(session.abort(e.into()));
                }
            }
            ClientAction::NeedParams(need) => match provide_blocking(params, need) {
                Ok(p) => queue.extend(session.supply_params(p)),
                Err(e) => {
                    tracing::error!(err=%e, "Unable to collect parameters");
                    queue.extend(session.abort(Outcome::Failed));
                }
            },
            ClientAction::Done(outcome) => return Some(outcome),
        }
    }
    None
}

/// Collecting parameters may block on a terminal: on a multi threaded
/// runtime the other tasks keep running meanwhile.
fn provide_blocking<P: ParamsProvider>(params: &mut P, need: NeedParams) -> Result<Params> {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| params.provide(need)),
        _ => params.provide(need),
    }
}
