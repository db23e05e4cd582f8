use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::bridge::codec::FrameError;
use crate::bridge::protocol::ControlCode;
use crate::launcher::LaunchError;
use crate::session::Channel;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error on {channel}: {source}")]
    Transport {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    #[error("invalid connection address '{0}'")]
    InvalidAddress(String),

    #[error("peer closed the {channel} channel")]
    PeerClosed { channel: Channel },

    #[error("timed out after {after:?} waiting on {channel}")]
    Timeout { channel: Channel, after: Duration },

    #[error("wait on {channel} was cancelled")]
    Cancelled { channel: Channel },

    #[error("{channel} is a {role} socket and cannot {op}")]
    RoleViolation {
        channel: Channel,
        role: &'static str,
        op: &'static str,
    },

    #[error("{channel} must {expected} before it can {op}")]
    OutOfTurn {
        channel: Channel,
        expected: &'static str,
        op: &'static str,
    },

    #[error("{channel} cannot {op} while {state}")]
    InvalidState {
        channel: Channel,
        state: &'static str,
        op: &'static str,
    },

    #[error("malformed message on {channel}: {source}")]
    Malformed {
        channel: Channel,
        #[source]
        source: FrameError,
    },

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("no setup address given (expected '{flag} <address>' in the arguments)")]
    MissingSetupAddress { flag: &'static str },

    #[error("session already finalized")]
    SessionFinalized,
}

impl Error {
    pub(crate) fn transport(channel: Channel, source: io::Error) -> Self {
        Self::Transport { channel, source }
    }

    pub(crate) fn malformed(channel: Channel, source: FrameError) -> Self {
        Self::Malformed { channel, source }
    }

    /// Place of this error in the control-code space, for diagnostics.
    pub fn code(&self) -> ControlCode {
        match self {
            Self::Malformed { .. }
            | Self::RoleViolation { .. }
            | Self::OutOfTurn { .. }
            | Self::InvalidState { .. }
            | Self::InvalidAddress(_)
            | Self::MissingSetupAddress { .. } => ControlCode::ProtocolError,
            Self::SessionFinalized | Self::Cancelled { .. } => ControlCode::Shutdown,
            Self::Transport { .. }
            | Self::PeerClosed { .. }
            | Self::Timeout { .. }
            | Self::Launch(_) => ControlCode::SocketError,
        }
    }

    /// True when the channel can no longer carry messages after this error.
    pub fn is_link_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::PeerClosed { .. }
                | Self::Timeout { .. }
                | Self::Cancelled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
