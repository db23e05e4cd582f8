//! Code space shared by request identifiers and acks on the `main` channel.
//!
//! Every round trip on `main` is one signed 64-bit word in each direction:
//! - **Driver → Worker**: a request identifier (`> 0` procedure, `0` none, `< 0` control)
//! - **Worker → Driver**: an ack code drawn from the same space

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved "no error / nothing to report" value.
pub const CODE_NONE: i64 = 0;

/// Negative values with session-management meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i64)]
pub enum ControlCode {
    /// End of session. Sent by the driver, echoed verbatim by the worker.
    Shutdown = -1,
    /// The worker failed to read a well-formed request.
    SocketError = -2,
    /// The worker received a negative identifier it does not recognize.
    ProtocolError = -3,
}

impl ControlCode {
    pub const ALL: [ControlCode; 3] = [Self::Shutdown, Self::SocketError, Self::ProtocolError];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::SocketError => "socket error",
            Self::ProtocolError => "protocol error",
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Identifier of a procedure in the external dispatch table. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcedureId(i64);

impl ProcedureId {
    pub fn new(id: i64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ProcedureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request identifier as interpreted by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Procedure(ProcedureId),
    /// Identifier `0`: acknowledged, never dispatched.
    Noop,
    Control(ControlCode),
    /// Negative value outside the defined control codes.
    Unrecognized(i64),
}

impl Request {
    pub fn classify(raw: i64) -> Self {
        if let Some(id) = ProcedureId::new(raw) {
            return Self::Procedure(id);
        }
        if raw == CODE_NONE {
            return Self::Noop;
        }
        match ControlCode::from_code(raw) {
            Some(code) => Self::Control(code),
            None => Self::Unrecognized(raw),
        }
    }

    pub fn raw(&self) -> i64 {
        match self {
            Self::Procedure(id) => id.get(),
            Self::Noop => CODE_NONE,
            Self::Control(code) => code.code(),
            Self::Unrecognized(raw) => *raw,
        }
    }
}

/// Ack/status word returned by the worker for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ack(i64);

impl Ack {
    pub const NONE: Ack = Ack(CODE_NONE);

    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == CODE_NONE
    }

    pub fn control(&self) -> Option<ControlCode> {
        ControlCode::from_code(self.0)
    }
}

impl From<ControlCode> for Ack {
    fn from(code: ControlCode) -> Self {
        Self(code.code())
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.control() {
            Some(code) => write!(f, "{code}"),
            None if self.is_none() => f.write_str("none (0)"),
            None => write!(f, "{}", self.0),
        }
    }
}
