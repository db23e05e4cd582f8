//! Local session settings.
//!
//! Nothing here crosses the process boundary: each side reads its own
//! configuration, and only the setup address travels to the worker.

use std::net::IpAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bridge::endpoint::{DEFAULT_MAX_FRAME_LENGTH, EndpointOptions};
use crate::bridge::transport::TransportKind;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Transport used for every address this side binds.
    pub transport: TransportKind,
    /// Bound on each channel wait. `None` keeps the unbounded behaviour.
    pub io_timeout: Option<Duration>,
    pub max_frame_length: usize,
    /// How long finalize waits for a launched worker process to exit before killing it.
    pub worker_exit_timeout: Duration,
    /// Cancelling this token fails every pending channel wait of the session.
    pub cancel: CancellationToken,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            io_timeout: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            worker_exit_timeout: Duration::from_secs(10),
            cancel: CancellationToken::new(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn with_max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len;
        self
    }

    pub fn with_worker_exit_timeout(mut self, timeout: Duration) -> Self {
        self.worker_exit_timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn endpoint_options(&self) -> EndpointOptions {
        EndpointOptions {
            io_timeout: self.io_timeout,
            max_frame_length: self.max_frame_length,
            cancel: self.cancel.clone(),
        }
    }

    /// Read `MLI_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        match lookup("MLI_TRANSPORT").as_deref() {
            None | Some("tcp") => {
                if let Some(host) = parse_var::<IpAddr>(&lookup, "MLI_HOST") {
                    config.transport = TransportKind::Tcp { host };
                }
            }
            #[cfg(unix)]
            Some("ipc") => {
                let dir = lookup("MLI_IPC_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(std::env::temp_dir);
                config.transport = TransportKind::Ipc { dir };
            }
            Some(other) => {
                tracing::warn!(transport = other, "Unknown MLI_TRANSPORT, using tcp");
            }
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "MLI_IO_TIMEOUT_MS") {
            config.io_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(len) = parse_var::<usize>(&lookup, "MLI_MAX_FRAME_BYTES") {
            config.max_frame_length = len;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "MLI_WORKER_EXIT_TIMEOUT_MS") {
            config.worker_exit_timeout = Duration::from_millis(ms);
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid setting");
            None
        }
    }
}
