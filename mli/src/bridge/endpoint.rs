//! Channel endpoint: one message socket with a fixed role.
//!
//! An endpoint starts unattached, then either binds (and attaches to its single
//! peer lazily, on first transfer) or connects. Request/Reply roles enforce strict
//! send/receive alternation; Push/Pull are one-directional. All waits honour the
//! configured I/O timeout and cancellation token.

use std::future::Future;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use super::codec::frame_codec;
use super::transport::{self, Address, Link, Listener, TransportKind};
use crate::error::{Error, Result};
use crate::session::Channel;

/// Default upper bound for a single message.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    /// Send only.
    Push,
    /// Receive only.
    Pull,
    /// Send, then receive, then send...
    Request,
    /// Receive, then send, then receive...
    Reply,
}

impl SocketRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Request => "request",
            Self::Reply => "reply",
        }
    }

    fn can_send(&self) -> bool {
        !matches!(self, Self::Pull)
    }

    fn can_recv(&self) -> bool {
        !matches!(self, Self::Push)
    }

    fn first_turn(&self) -> Turn {
        match self {
            Self::Push | Self::Request => Turn::Send,
            Self::Pull | Self::Reply => Turn::Recv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointOptions {
    /// Bound on every wait (accept, connect, send, receive). `None` waits forever.
    pub io_timeout: Option<Duration>,
    pub max_frame_length: usize,
    pub cancel: CancellationToken,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            io_timeout: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Send,
    Recv,
}

enum State {
    Unattached,
    Listening(Listener),
    Linked(Framed<Link, LengthDelimitedCodec>),
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Unattached => "unattached",
            Self::Listening(_) => "listening",
            Self::Linked(_) => "connected",
            Self::Closed => "closed",
        }
    }
}

pub struct Endpoint {
    channel: Channel,
    role: SocketRole,
    options: EndpointOptions,
    state: State,
    turn: Turn,
}

impl Endpoint {
    pub fn new(channel: Channel, role: SocketRole, options: EndpointOptions) -> Self {
        Self {
            channel,
            role,
            options,
            state: State::Unattached,
            turn: role.first_turn(),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn role(&self) -> SocketRole {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// A request went out and its reply has not been received yet.
    pub fn awaiting_reply(&self) -> bool {
        self.role == SocketRole::Request && self.turn == Turn::Recv
    }

    /// Allocate an ephemeral local address and start listening on it.
    pub async fn bind(&mut self, kind: &TransportKind) -> Result<Address> {
        self.require_unattached("bind")?;
        let (listener, address) = Listener::bind(kind)
            .await
            .map_err(|e| Error::transport(self.channel, e))?;
        tracing::debug!(channel = %self.channel, %address, "Endpoint bound");
        self.state = State::Listening(listener);
        Ok(address)
    }

    /// Attach to a bound peer. Returns once the transport queued the connection.
    pub async fn connect(&mut self, address: &Address) -> Result<()> {
        self.require_unattached("connect")?;
        let channel = self.channel;
        let link = bounded(
            async {
                transport::connect(address)
                    .await
                    .map_err(|e| Error::transport(channel, e))
            },
            channel,
            self.options.io_timeout,
            &self.options.cancel,
        )
        .await?;
        tracing::debug!(%channel, %address, "Endpoint connected");
        self.state = State::Linked(Framed::new(link, frame_codec(self.options.max_frame_length)));
        Ok(())
    }

    pub async fn send(&mut self, payload: Bytes) -> Result<()> {
        if !self.role.can_send() {
            return Err(self.role_violation("send"));
        }
        if self.turn != Turn::Send {
            return Err(Error::OutOfTurn {
                channel: self.channel,
                expected: "receive",
                op: "send",
            });
        }

        let channel = self.channel;
        let max_frame_length = self.options.max_frame_length;
        let state = &mut self.state;
        bounded(
            async move {
                let framed = attach(state, channel, max_frame_length).await?;
                framed
                    .send(payload)
                    .await
                    .map_err(|e| Error::transport(channel, e))
            },
            channel,
            self.options.io_timeout,
            &self.options.cancel,
        )
        .await?;

        self.advance();
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Bytes> {
        if !self.role.can_recv() {
            return Err(self.role_violation("receive"));
        }
        if self.turn != Turn::Recv {
            return Err(Error::OutOfTurn {
                channel: self.channel,
                expected: "send",
                op: "receive",
            });
        }

        let channel = self.channel;
        let max_frame_length = self.options.max_frame_length;
        let state = &mut self.state;
        let frame = bounded(
            async move {
                let framed = attach(state, channel, max_frame_length).await?;
                match framed.next().await {
                    Some(Ok(frame)) => Ok(frame.freeze()),
                    Some(Err(e)) => Err(Error::transport(channel, e)),
                    None => Err(Error::PeerClosed { channel }),
                }
            },
            channel,
            self.options.io_timeout,
            &self.options.cancel,
        )
        .await?;

        self.advance();
        Ok(frame)
    }

    /// Release the socket. Returns `false` if the endpoint was already closed.
    pub fn close(&mut self) -> bool {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => false,
            previous => {
                tracing::trace!(channel = %self.channel, from = previous.name(), "Endpoint closed");
                true
            }
        }
    }

    fn advance(&mut self) {
        if matches!(self.role, SocketRole::Request | SocketRole::Reply) {
            self.turn = match self.turn {
                Turn::Send => Turn::Recv,
                Turn::Recv => Turn::Send,
            };
        }
    }

    fn require_unattached(&self, op: &'static str) -> Result<()> {
        match self.state {
            State::Unattached => Ok(()),
            ref other => Err(Error::InvalidState {
                channel: self.channel,
                state: other.name(),
                op,
            }),
        }
    }

    fn role_violation(&self, op: &'static str) -> Error {
        Error::RoleViolation {
            channel: self.channel,
            role: self.role.as_str(),
            op,
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("channel", &self.channel)
            .field("role", &self.role)
            .field("state", &self.state.name())
            .finish()
    }
}

/// Accept the single peer of a bound endpoint, if that has not happened yet.
async fn attach(
    state: &mut State,
    channel: Channel,
    max_frame_length: usize,
) -> Result<&mut Framed<Link, LengthDelimitedCodec>> {
    if let State::Listening(listener) = state {
        tracing::trace!(%channel, "Waiting for peer");
        let link = listener
            .accept()
            .await
            .map_err(|e| Error::transport(channel, e))?;
        tracing::trace!(%channel, "Peer attached");
        *state = State::Linked(Framed::new(link, frame_codec(max_frame_length)));
    }
    match state {
        State::Linked(framed) => Ok(framed),
        other => Err(Error::InvalidState {
            channel,
            state: other.name(),
            op: "transfer",
        }),
    }
}

async fn bounded<T>(
    op: impl Future<Output = Result<T>>,
    channel: Channel,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T> {
    let op = async {
        match timeout {
            Some(after) => tokio::time::timeout(after, op)
                .await
                .map_err(|_| Error::Timeout { channel, after })?,
            None => op.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled { channel }),
        result = op => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bound_pair(
        bound_role: SocketRole,
        connected_role: SocketRole,
        options: EndpointOptions,
    ) -> (Endpoint, Endpoint) {
        let mut bound = Endpoint::new(Channel::Main, bound_role, options.clone());
        let mut connected = Endpoint::new(Channel::Main, connected_role, options);
        let address = bound.bind(&TransportKind::default()).await.unwrap();
        connected.connect(&address).await.unwrap();
        (bound, connected)
    }

    #[tokio::test]
    async fn push_to_bound_pull() {
        let (mut pull, mut push) =
            bound_pair(SocketRole::Pull, SocketRole::Push, EndpointOptions::default()).await;

        push.send(Bytes::from_static(b"one")).await.unwrap();
        push.send(Bytes::from_static(b"")).await.unwrap();
        push.send(Bytes::from_static(b"three")).await.unwrap();

        assert_eq!(&pull.recv().await.unwrap()[..], b"one");
        assert_eq!(&pull.recv().await.unwrap()[..], b"");
        assert_eq!(&pull.recv().await.unwrap()[..], b"three");
    }

    #[tokio::test]
    async fn request_reply_alternate() {
        let (mut rep, mut req) =
            bound_pair(SocketRole::Reply, SocketRole::Request, EndpointOptions::default()).await;

        for i in 0..3u8 {
            assert!(!req.awaiting_reply());
            req.send(Bytes::from(vec![i])).await.unwrap();
            assert!(req.awaiting_reply());
            assert_eq!(&rep.recv().await.unwrap()[..], &[i]);
            assert!(!rep.awaiting_reply());
            rep.send(Bytes::from(vec![i + 100])).await.unwrap();
            assert_eq!(&req.recv().await.unwrap()[..], &[i + 100]);
        }
        assert!(!req.awaiting_reply());
    }

    #[tokio::test]
    async fn bound_side_may_speak_first() {
        let (mut req, mut rep) =
            bound_pair(SocketRole::Request, SocketRole::Reply, EndpointOptions::default()).await;

        req.send(Bytes::from_static(b"result")).await.unwrap();
        assert_eq!(&rep.recv().await.unwrap()[..], b"result");
    }

    #[tokio::test]
    async fn out_of_turn_does_no_io() {
        let (mut rep, mut req) =
            bound_pair(SocketRole::Reply, SocketRole::Request, EndpointOptions::default()).await;

        assert!(matches!(
            req.recv().await,
            Err(Error::OutOfTurn { op: "receive", .. })
        ));
        assert!(matches!(
            rep.send(Bytes::new()).await,
            Err(Error::OutOfTurn { op: "send", .. })
        ));

        req.send(Bytes::from_static(b"x")).await.unwrap();
        assert!(matches!(
            req.send(Bytes::from_static(b"y")).await,
            Err(Error::OutOfTurn { .. })
        ));
        assert_eq!(&rep.recv().await.unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn directional_roles_reject_the_other_direction() {
        let mut push = Endpoint::new(Channel::Setup, SocketRole::Push, EndpointOptions::default());
        let mut pull = Endpoint::new(Channel::Setup, SocketRole::Pull, EndpointOptions::default());

        let err = push.recv().await.unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"setup is a push socket and cannot receive");
        assert!(matches!(
            pull.send(Bytes::new()).await,
            Err(Error::RoleViolation { op: "send", .. })
        ));
    }

    #[tokio::test]
    async fn transfer_requires_attachment() {
        let mut push = Endpoint::new(Channel::Arg, SocketRole::Push, EndpointOptions::default());
        assert!(matches!(
            push.send(Bytes::new()).await,
            Err(Error::InvalidState {
                state: "unattached",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn bind_twice_is_rejected() {
        let mut ep = Endpoint::new(Channel::Res, SocketRole::Reply, EndpointOptions::default());
        ep.bind(&TransportKind::default()).await.unwrap();
        assert!(matches!(
            ep.bind(&TransportKind::default()).await,
            Err(Error::InvalidState {
                state: "listening",
                op: "bind",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn recv_times_out() {
        let options = EndpointOptions {
            io_timeout: Some(Duration::from_millis(50)),
            ..EndpointOptions::default()
        };
        let (mut pull, _push) = bound_pair(SocketRole::Pull, SocketRole::Push, options).await;

        let err = pull.recv().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_link_fatal());
    }

    #[tokio::test]
    async fn cancellation_unblocks_recv() {
        let options = EndpointOptions::default();
        let cancel = options.cancel.clone();
        let mut pull = Endpoint::new(Channel::Setup, SocketRole::Pull, options);
        pull.bind(&TransportKind::default()).await.unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        assert!(matches!(
            pull.recv().await,
            Err(Error::Cancelled {
                channel: Channel::Setup
            })
        ));
    }

    #[tokio::test]
    async fn peer_close_is_reported() {
        let (mut pull, mut push) =
            bound_pair(SocketRole::Pull, SocketRole::Push, EndpointOptions::default()).await;
        push.send(Bytes::from_static(b"last")).await.unwrap();
        assert!(push.close());

        assert_eq!(&pull.recv().await.unwrap()[..], b"last");
        assert!(matches!(
            pull.recv().await,
            Err(Error::PeerClosed { .. })
        ));
    }

    #[tokio::test]
    async fn oversized_frame_is_a_transport_error() {
        let options = EndpointOptions {
            max_frame_length: 4,
            ..EndpointOptions::default()
        };
        let (_pull, mut push) = bound_pair(SocketRole::Pull, SocketRole::Push, options).await;
        assert!(matches!(
            push.send(Bytes::from_static(b"too long")).await,
            Err(Error::Transport { .. })
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let mut ep = Endpoint::new(Channel::Main, SocketRole::Request, EndpointOptions::default());
        assert!(ep.close(), "never-attached endpoint closes once");
        assert!(!ep.close());
        assert!(ep.is_closed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ipc_pair_exchanges_messages() {
        let dir = tempfile::tempdir().unwrap();
        let kind = TransportKind::Ipc {
            dir: dir.path().to_path_buf(),
        };
        let mut rep = Endpoint::new(Channel::Arg, SocketRole::Reply, EndpointOptions::default());
        let mut req = Endpoint::new(Channel::Arg, SocketRole::Request, EndpointOptions::default());
        let address = rep.bind(&kind).await.unwrap();
        req.connect(&address).await.unwrap();

        req.send(Bytes::from_static(b"args")).await.unwrap();
        assert_eq!(&rep.recv().await.unwrap()[..], b"args");
    }
}
