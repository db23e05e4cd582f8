//! Driver side of a session.
//!
//! Flow:
//! 1. Bind `setup`, launch the worker with its address
//! 2. Pull the worker's `main`/`arg`/`res` addresses and connect
//! 3. Round-trip request identifiers on `main`
//! 4. Shutdown handshake, close endpoints, reap the worker

use crate::bootstrap::bootstrap_driver;
use crate::bridge::codec::{decode_word, encode_word};
use crate::bridge::protocol::{Ack, ControlCode, ProcedureId};
use crate::config::SessionConfig;
use crate::dispatch::PayloadChannels;
use crate::error::{Error, Result};
use crate::launcher::{LaunchedWorker, WorkerLauncher};
use crate::session::{Channel, Role, SessionContext};

/// How the shutdown handshake ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker echoed the shutdown code.
    Acknowledged,
    /// The worker answered with something other than the shutdown code.
    Unexpected(Ack),
    /// Finalize had already run.
    AlreadyFinalized,
}

pub struct DriverSession {
    ctx: SessionContext,
    worker: LaunchedWorker,
    config: SessionConfig,
}

impl DriverSession {
    /// Bootstrap a session: launch the worker via `launcher` and connect to it.
    ///
    /// Any failure tears down the partial session before returning.
    pub async fn init(
        argv: &[String],
        launcher: &dyn WorkerLauncher,
        config: SessionConfig,
    ) -> Result<Self> {
        let mut ctx = SessionContext::new(Role::Driver, config.endpoint_options());

        match bootstrap_driver(&mut ctx, &config.transport, argv, launcher).await {
            Ok(worker) => {
                tracing::info!(
                    transport = config.transport.as_str(),
                    worker_pid = ?worker.id(),
                    "Driver session established"
                );
                Ok(Self {
                    ctx,
                    worker,
                    config,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, code = e.code().code(), "Bootstrap failed");
                ctx.finalize();
                Err(e)
            }
        }
    }

    /// Ask the worker to run procedure `id`. Resolves once the worker acknowledged receipt.
    pub async fn request(&mut self, id: ProcedureId) -> Result<Ack> {
        self.round_trip(id.get()).await
    }

    /// Send any identifier, control codes included, and wait for its ack.
    ///
    /// If a previous call timed out or was cancelled while waiting, its ack is
    /// drained first so the request/ack pairing stays aligned.
    pub async fn round_trip(&mut self, raw: i64) -> Result<Ack> {
        if self.ctx.is_finalized() {
            return Err(Error::SessionFinalized);
        }
        let main = self.ctx.endpoint_mut(Channel::Main);
        if main.awaiting_reply() {
            // An earlier wait gave up before its ack arrived.
            let stale = main.recv().await?;
            tracing::warn!(ack = ?decode_word(&stale).ok(), "Discarded late ack");
        }
        tracing::trace!(id = raw, "Sending request");
        main.send(encode_word(raw)).await?;
        let frame = main.recv().await?;
        let ack = decode_word(&frame)
            .map(Ack::from_raw)
            .map_err(|e| Error::malformed(Channel::Main, e))?;
        tracing::trace!(id = raw, %ack, "Received ack");
        Ok(ack)
    }

    /// Endpoints for the marshaling layer: `arg` requests, `res` replies.
    pub fn payload_channels(&mut self) -> Result<PayloadChannels<'_>> {
        if self.ctx.is_finalized() {
            return Err(Error::SessionFinalized);
        }
        Ok(self.ctx.payload_channels())
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.worker.id()
    }

    pub fn is_finalized(&self) -> bool {
        self.ctx.is_finalized()
    }

    /// Shut the worker down and release every endpoint.
    ///
    /// Teardown happens even when the handshake fails; the handshake error is
    /// returned afterwards. Calling this again is a no-op.
    pub async fn finalize(&mut self) -> Result<ShutdownOutcome> {
        if self.ctx.is_finalized() {
            return Ok(ShutdownOutcome::AlreadyFinalized);
        }

        let handshake = self.round_trip(ControlCode::Shutdown.code()).await;

        self.ctx.finalize();
        self.worker.reap(self.config.worker_exit_timeout).await;

        let ack = handshake.inspect_err(|e| {
            tracing::warn!(error = %e, code = e.code().code(), "Shutdown handshake failed");
        })?;
        if ack.control() == Some(ControlCode::Shutdown) {
            tracing::info!("Worker acknowledged shutdown");
            Ok(ShutdownOutcome::Acknowledged)
        } else {
            tracing::warn!(%ack, "Unexpected response to shutdown");
            Ok(ShutdownOutcome::Unexpected(ack))
        }
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        if self.ctx.finalize() {
            tracing::warn!("Driver session dropped without finalize");
        }
    }
}
