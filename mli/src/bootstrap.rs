//! Address exchange that turns one shared setup address into three connected channels.
//!
//! Driver: bind `setup`, launch the worker with its address, then pull three
//! address records and connect `main`, `arg`, `res` in that order.
//! Worker: connect `setup`, then bind `main`, `arg`, `res` in that order and
//! push each address as it is allocated.
//!
//! Records carry no channel tag: both sides must walk [`Channel::EXCHANGED`].

use crate::bridge::codec::{decode_address, decode_address_length, encode_address};
use crate::bridge::endpoint::Endpoint;
use crate::bridge::transport::{Address, TransportKind};
use crate::error::{Error, Result};
use crate::launcher::{LaunchedWorker, WorkerLauncher, worker_argv};
use crate::session::{Channel, SessionContext};

/// Send one length-prefixed address record.
pub async fn push_address(setup: &mut Endpoint, address: &str) -> Result<()> {
    let (prefix, text) =
        encode_address(address).map_err(|e| Error::malformed(setup.channel(), e))?;
    tracing::trace!(len = text.len(), "Pushing address length");
    setup.send(prefix).await?;
    tracing::trace!(%address, "Pushing address text");
    setup.send(text).await
}

/// Receive one length-prefixed address record.
pub async fn pull_address(setup: &mut Endpoint) -> Result<String> {
    let channel = setup.channel();
    let prefix = setup.recv().await?;
    let len = decode_address_length(&prefix).map_err(|e| Error::malformed(channel, e))?;
    tracing::trace!(len, "Expecting address text");
    let text = setup.recv().await?;
    decode_address(&text, len).map_err(|e| Error::malformed(channel, e))
}

/// Driver half. On success `main`, `arg` and `res` are connected to the worker.
pub async fn bootstrap_driver(
    ctx: &mut SessionContext,
    kind: &TransportKind,
    argv: &[String],
    launcher: &dyn WorkerLauncher,
) -> Result<LaunchedWorker> {
    let setup_address = ctx.endpoint_mut(Channel::Setup).bind(kind).await?;
    tracing::debug!(%setup_address, "Setup socket bound");

    let argv = worker_argv(argv, &setup_address);
    tracing::debug!(args = argv.len(), "Launching worker");
    let worker = launcher.launch(&argv)?;

    for channel in Channel::EXCHANGED {
        let text = pull_address(ctx.endpoint_mut(Channel::Setup)).await?;
        let address: Address = text.parse()?;
        tracing::debug!(%channel, %address, "Received connection info");
        ctx.endpoint_mut(channel).connect(&address).await?;
    }

    Ok(worker)
}

/// Worker half. On success the worker is ready to serve `main`.
pub async fn bootstrap_worker(
    ctx: &mut SessionContext,
    kind: &TransportKind,
    setup: &Address,
) -> Result<()> {
    ctx.endpoint_mut(Channel::Setup).connect(setup).await?;
    tracing::debug!(%setup, "Connected to setup socket");

    for channel in Channel::EXCHANGED {
        let address = ctx.endpoint_mut(channel).bind(kind).await?;
        tracing::debug!(%channel, %address, "Sending connection info");
        push_address(ctx.endpoint_mut(Channel::Setup), &address.to_string()).await?;
    }

    Ok(())
}
