//! mli: private driver/worker channels for multi-language interoperability.
//!
//! A driver launches a worker process, exchanges connection addresses over a
//! setup channel, then asks the worker to run procedures by identifier.

pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod session;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use bridge::protocol::{Ack, ControlCode, ProcedureId, Request};
pub use bridge::transport::{Address, TransportKind};
pub use config::SessionConfig;
pub use dispatch::{DispatchTable, PayloadChannels};
pub use driver::{DriverSession, ShutdownOutcome};
pub use error::{Error, Result};
pub use launcher::{LaunchError, LaunchedWorker, ProcessLauncher, SETUP_FLAG, WorkerLauncher};
pub use session::{Channel, Role, SessionContext};
pub use worker::{ServeSummary, WorkerSession, run_worker};
