//! Worker side of a session.
//!
//! The parent side (launch, address pull, shutdown) is in driver.rs.
//!
//! The dispatch loop reads one identifier from `main`, acks it, and only then
//! runs positive identifiers through the dispatch table, so the driver learns a
//! request arrived before the procedure starts.

use std::time::Instant;

use serde::Serialize;

use crate::bootstrap::bootstrap_worker;
use crate::bridge::codec::{decode_word, encode_word};
use crate::bridge::protocol::{Ack, ControlCode, Request};
use crate::bridge::transport::Address;
use crate::config::SessionConfig;
use crate::dispatch::DispatchTable;
use crate::error::{Error, Result};
use crate::launcher::setup_address_from_args;
use crate::session::{Channel, Role, SessionContext};

/// What a finished dispatch loop did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServeSummary {
    /// Messages read from `main`, shutdown included.
    pub requests: u64,
    pub dispatched: u64,
    pub socket_errors: u64,
    pub protocol_errors: u64,
    /// Status returned by the most recent dispatch.
    pub last_status: i64,
    pub final_code: Option<ControlCode>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Listening,
    Terminated,
}

pub struct WorkerSession {
    ctx: SessionContext,
}

impl WorkerSession {
    /// Connect to the driver's setup socket and announce `main`, `arg`, `res`.
    pub async fn start(setup: &Address, config: &SessionConfig) -> Result<Self> {
        tracing::info!(%setup, "Starting worker session");
        let mut ctx = SessionContext::new(Role::Worker, config.endpoint_options());
        if let Err(e) = bootstrap_worker(&mut ctx, &config.transport, setup).await {
            tracing::error!(error = %e, code = e.code().code(), "Bootstrap failed");
            ctx.finalize();
            return Err(e);
        }
        Ok(Self { ctx })
    }

    /// Run the dispatch loop until shutdown, then release every endpoint.
    ///
    /// Terminal: once the loop has ended the session cannot serve again.
    pub async fn serve<D>(&mut self, table: &mut D) -> Result<ServeSummary>
    where
        D: DispatchTable + ?Sized,
    {
        if self.ctx.is_finalized() {
            return Err(Error::SessionFinalized);
        }
        let result = self.dispatch_loop(table).await;
        self.ctx.finalize();
        result
    }

    pub fn is_finalized(&self) -> bool {
        self.ctx.is_finalized()
    }

    /// Close every endpoint without serving. Returns `false` if already finalized.
    pub fn finalize(&mut self) -> bool {
        self.ctx.finalize()
    }

    async fn dispatch_loop<D>(&mut self, table: &mut D) -> Result<ServeSummary>
    where
        D: DispatchTable + ?Sized,
    {
        let started = Instant::now();
        let mut summary = ServeSummary::default();
        let mut state = LoopState::Listening;

        while state == LoopState::Listening {
            tracing::trace!("Listening...");
            let main = self.ctx.endpoint_mut(Channel::Main);

            // Every transaction starts by reading an i64 off the wire.
            let request = match main.recv().await.and_then(|frame| {
                decode_word(&frame).map_err(|e| Error::malformed(Channel::Main, e))
            }) {
                Ok(raw) => Some(Request::classify(raw)),
                Err(e @ Error::Malformed { .. }) => {
                    tracing::warn!(error = %e, "Socket error on read");
                    None
                }
                Err(e) => {
                    tracing::error!(error = %e, code = e.code().code(), "Main channel failed");
                    return Err(e);
                }
            };
            summary.requests += 1;

            let ack = match request {
                None => {
                    summary.socket_errors += 1;
                    Ack::from(ControlCode::SocketError)
                }
                Some(Request::Control(ControlCode::Shutdown)) => {
                    tracing::debug!("Driver requested shutdown");
                    state = LoopState::Terminated;
                    Ack::from(ControlCode::Shutdown)
                }
                Some(other @ (Request::Control(_) | Request::Unrecognized(_))) => {
                    tracing::warn!(code = other.raw(), "Unrecognized control code");
                    summary.protocol_errors += 1;
                    Ack::from(ControlCode::ProtocolError)
                }
                Some(req @ (Request::Noop | Request::Procedure(_))) => {
                    tracing::trace!(id = req.raw(), "Received request");
                    Ack::NONE
                }
            };

            tracing::trace!(%ack, "Responding");
            if let Err(e) = main.send(encode_word(ack.raw())).await {
                if state == LoopState::Terminated {
                    tracing::warn!(error = %e, "Failed to acknowledge shutdown");
                    break;
                }
                tracing::error!(error = %e, code = e.code().code(), "Socket error on write");
                return Err(e);
            }

            if state == LoopState::Listening
                && let Some(Request::Procedure(id)) = request
            {
                let status = table.dispatch(id, self.ctx.payload_channels()).await;
                tracing::trace!(%id, status, "Dispatch returned");
                summary.dispatched += 1;
                summary.last_status = status;
            }
        }

        summary.final_code = Some(ControlCode::Shutdown);
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            requests = summary.requests,
            dispatched = summary.dispatched,
            elapsed_secs = summary.elapsed_secs,
            "Worker loop shut down"
        );
        Ok(summary)
    }
}

impl Drop for WorkerSession {
    fn drop(&mut self) {
        if self.ctx.finalize() {
            tracing::debug!("Worker session dropped before serving");
        }
    }
}

/// Worker entry point: find the setup address in `args`, bootstrap, serve until shutdown.
pub async fn run_worker<I, S, D>(args: I, table: &mut D, config: SessionConfig) -> Result<ServeSummary>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    D: DispatchTable + ?Sized,
{
    let setup = setup_address_from_args(args)?;
    let mut session = WorkerSession::start(&setup, &config).await?;
    session.serve(table).await
}
