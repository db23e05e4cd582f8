//! Worker launch capability.
//!
//! The driver hands the launcher its argument vector extended with
//! `[SETUP_FLAG, <setup address>]`; the worker finds the address again with
//! [`setup_address_from_args`]. Launching must not wait for the worker.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::bridge::transport::Address;
use crate::error::{Error, Result};

/// Flag token that precedes the setup address on the worker's command line.
pub const SETUP_FLAG: &str = "--mli-socket-loc";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("empty argument vector")]
    EmptyArgv,
    #[error("launch failed: {0}")]
    Other(String),
}

/// Handle on whatever the launcher started.
#[derive(Debug)]
pub struct LaunchedWorker {
    child: Option<Child>,
}

impl LaunchedWorker {
    pub fn process(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// A worker the driver does not own (in-process stub, external launcher).
    pub fn detached() -> Self {
        Self { child: None }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Wait for the worker process to exit, killing it after `grace`.
    pub(crate) async fn reap(&mut self, grace: Duration) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "Worker exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for worker"),
            Err(_) => {
                tracing::warn!(?grace, "Worker did not exit in time, killing it");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill worker");
                }
            }
        }
        self.child = None;
    }
}

/// Extension point for different worker launch strategies.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, argv: &[String]) -> std::result::Result<LaunchedWorker, LaunchError>;
}

/// Spawns `argv[0]` as a child process with the remaining arguments.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, argv: &[String]) -> std::result::Result<LaunchedWorker, LaunchError> {
        let (program, args) = argv.split_first().ok_or(LaunchError::EmptyArgv)?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        tracing::debug!(program = %program, pid = ?child.id(), "Spawned worker process");
        Ok(LaunchedWorker::process(child))
    }
}

/// Caller's argv plus the setup flag and address.
pub fn worker_argv(argv: &[String], setup: &Address) -> Vec<String> {
    let mut extended = Vec::with_capacity(argv.len() + 2);
    extended.extend_from_slice(argv);
    extended.push(SETUP_FLAG.to_string());
    extended.push(setup.to_string());
    extended
}

/// Locate the setup address in a worker's arguments.
pub fn setup_address_from_args<I, S>(args: I) -> Result<Address>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg.as_ref() == SETUP_FLAG {
            let value = args.next().ok_or(Error::MissingSetupAddress { flag: SETUP_FLAG })?;
            return value.as_ref().parse();
        }
    }
    Err(Error::MissingSetupAddress { flag: SETUP_FLAG })
}
