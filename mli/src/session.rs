//! Session context: the four endpoints one process owns for one session.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bridge::endpoint::{Endpoint, EndpointOptions, SocketRole};
use crate::dispatch::PayloadChannels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Setup,
    Main,
    Arg,
    Res,
}

impl Channel {
    /// Channels whose addresses travel over `setup`, in protocol order.
    pub const EXCHANGED: [Channel; 3] = [Self::Main, Self::Arg, Self::Res];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Main => "main",
            Self::Arg => "arg",
            Self::Res => "res",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Worker,
}

impl Role {
    /// Socket role of `channel` on this side of the session.
    pub fn socket_role(&self, channel: Channel) -> SocketRole {
        match (self, channel) {
            (Self::Driver, Channel::Setup) => SocketRole::Pull,
            (Self::Worker, Channel::Setup) => SocketRole::Push,
            (Self::Driver, Channel::Main | Channel::Arg) => SocketRole::Request,
            (Self::Worker, Channel::Main | Channel::Arg) => SocketRole::Reply,
            (Self::Driver, Channel::Res) => SocketRole::Reply,
            (Self::Worker, Channel::Res) => SocketRole::Request,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Worker => "worker",
        }
    }
}

/// All four endpoints of one side, created together and closed together.
#[derive(Debug)]
pub struct SessionContext {
    role: Role,
    setup: Endpoint,
    main: Endpoint,
    arg: Endpoint,
    res: Endpoint,
    finalized: bool,
}

impl SessionContext {
    pub fn new(role: Role, options: EndpointOptions) -> Self {
        let endpoint = |channel| Endpoint::new(channel, role.socket_role(channel), options.clone());
        Self {
            role,
            setup: endpoint(Channel::Setup),
            main: endpoint(Channel::Main),
            arg: endpoint(Channel::Arg),
            res: endpoint(Channel::Res),
            finalized: false,
        }
    }

    pub fn endpoint(&self, channel: Channel) -> &Endpoint {
        match channel {
            Channel::Setup => &self.setup,
            Channel::Main => &self.main,
            Channel::Arg => &self.arg,
            Channel::Res => &self.res,
        }
    }

    pub fn endpoint_mut(&mut self, channel: Channel) -> &mut Endpoint {
        match channel {
            Channel::Setup => &mut self.setup,
            Channel::Main => &mut self.main,
            Channel::Arg => &mut self.arg,
            Channel::Res => &mut self.res,
        }
    }

    pub fn payload_channels(&mut self) -> PayloadChannels<'_> {
        PayloadChannels {
            arg: &mut self.arg,
            res: &mut self.res,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Close every endpoint. Returns `false` when the context was already finalized.
    pub fn finalize(&mut self) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        let closed = [
            self.setup.close(),
            self.main.close(),
            self.arg.close(),
            self.res.close(),
        ];
        tracing::debug!(
            role = self.role.as_str(),
            closed = closed.iter().filter(|c| **c).count(),
            "Session context finalized"
        );
        true
    }
}
