//! In-process workers for session tests.

use std::future::Future;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::bootstrap::bootstrap_worker;
use crate::bridge::endpoint::EndpointOptions;
use crate::bridge::protocol::ProcedureId;
use crate::bridge::transport::TransportKind;
use crate::config::SessionConfig;
use crate::dispatch::{DispatchTable, PayloadChannels};
use crate::error::Result;
use crate::launcher::{LaunchError, LaunchedWorker, WorkerLauncher, setup_address_from_args};
use crate::session::{Role, SessionContext};
use crate::worker::{ServeSummary, run_worker};

/// Records every dispatched identifier and returns how many it has seen.
#[derive(Debug, Default)]
pub struct EchoCounter {
    pub seen: Vec<i64>,
}

#[async_trait]
impl DispatchTable for EchoCounter {
    async fn dispatch(&mut self, id: ProcedureId, _channels: PayloadChannels<'_>) -> i64 {
        self.seen.push(id.get());
        self.seen.len() as i64
    }
}

/// Runs the real worker loop on a tokio task.
pub struct InProcessWorker<D> {
    table: Mutex<Option<D>>,
    config: SessionConfig,
    task: Mutex<Option<JoinHandle<(Result<ServeSummary>, D)>>>,
}

impl<D: DispatchTable + 'static> InProcessWorker<D> {
    pub fn new(table: D) -> Self {
        Self::with_config(table, SessionConfig::default())
    }

    pub fn with_config(table: D, config: SessionConfig) -> Self {
        Self {
            table: Mutex::new(Some(table)),
            config,
            task: Mutex::new(None),
        }
    }

    /// Wait for the worker loop to end and hand back its table.
    pub async fn join(&self) -> (Result<ServeSummary>, D) {
        let task = self.task.lock().unwrap().take().expect("worker was never launched");
        task.await.unwrap()
    }
}

impl<D: DispatchTable + 'static> WorkerLauncher for InProcessWorker<D> {
    fn launch(&self, argv: &[String]) -> std::result::Result<LaunchedWorker, LaunchError> {
        let mut table = self
            .table
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LaunchError::Other("already launched".to_string()))?;
        let argv = argv.to_vec();
        let config = self.config.clone();
        let task = tokio::spawn(async move {
            let result = run_worker(argv, &mut table, config).await;
            (result, table)
        });
        *self.task.lock().unwrap() = Some(task);
        Ok(LaunchedWorker::detached())
    }
}

type Script = Box<dyn FnOnce(SessionContext) -> BoxFuture<'static, SessionContext> + Send>;

/// Bootstraps normally, then hands the worker context to a test script instead of the loop.
pub struct StubWorker {
    script: Mutex<Option<Script>>,
    task: Mutex<Option<JoinHandle<SessionContext>>>,
}

impl StubWorker {
    pub fn scripted<F, Fut>(script: F) -> Self
    where
        F: FnOnce(SessionContext) -> Fut + Send + 'static,
        Fut: Future<Output = SessionContext> + Send + 'static,
    {
        let script: Script = Box::new(move |ctx| Box::pin(script(ctx)));
        Self {
            script: Mutex::new(Some(script)),
            task: Mutex::new(None),
        }
    }

    pub async fn join(&self) -> SessionContext {
        let task = self.task.lock().unwrap().take().expect("stub was never launched");
        task.await.unwrap()
    }
}

impl WorkerLauncher for StubWorker {
    fn launch(&self, argv: &[String]) -> std::result::Result<LaunchedWorker, LaunchError> {
        let setup =
            setup_address_from_args(argv).map_err(|e| LaunchError::Other(e.to_string()))?;
        let script = self
            .script
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| LaunchError::Other("already launched".to_string()))?;
        let task = tokio::spawn(async move {
            let mut ctx = SessionContext::new(Role::Worker, EndpointOptions::default());
            bootstrap_worker(&mut ctx, &TransportKind::default(), &setup)
                .await
                .unwrap();
            script(ctx).await
        });
        *self.task.lock().unwrap() = Some(task);
        Ok(LaunchedWorker::detached())
    }
}
