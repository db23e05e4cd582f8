//! Stream transports underneath the endpoints.
//!
//! - **Tcp**: loopback (or configured host) sockets on an ephemeral port
//! - **Ipc**: filesystem Unix sockets under a configurable directory (Unix only)
//!
//! Addresses are rendered as `tcp://127.0.0.1:40123` or `ipc:///tmp/mli-<uuid>.sock`
//! so they can travel as plain text over the setup channel or on a command line.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::error::Error;

const TCP_SCHEME: &str = "tcp://";
#[cfg(unix)]
const IPC_SCHEME: &str = "ipc://";

/// Where an endpoint can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Ipc(PathBuf),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{TCP_SCHEME}{addr}"),
            #[cfg(unix)]
            Self::Ipc(path) => write!(f, "{IPC_SCHEME}{}", path.display()),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(TCP_SCHEME) {
            let addr = rest
                .parse::<SocketAddr>()
                .map_err(|_| Error::InvalidAddress(s.to_string()))?;
            return Ok(Self::Tcp(addr));
        }
        #[cfg(unix)]
        if let Some(rest) = s.strip_prefix(IPC_SCHEME)
            && !rest.is_empty()
        {
            return Ok(Self::Ipc(PathBuf::from(rest)));
        }
        Err(Error::InvalidAddress(s.to_string()))
    }
}

/// Which transport `bind` allocates addresses on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    Tcp {
        host: IpAddr,
    },
    #[cfg(unix)]
    Ipc {
        dir: PathBuf,
    },
}

impl Default for TransportKind {
    fn default() -> Self {
        Self::Tcp {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            #[cfg(unix)]
            Self::Ipc { .. } => "ipc",
        }
    }
}

/// Byte stream carrying framed messages for one endpoint.
pub(crate) trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

pub(crate) type Link = Box<dyn Duplex>;

/// Bound socket waiting for its single peer.
pub(crate) enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc(IpcListener),
}

impl Listener {
    /// Bind on an ephemeral address of the given transport.
    pub(crate) async fn bind(kind: &TransportKind) -> io::Result<(Self, Address)> {
        match kind {
            TransportKind::Tcp { host } => {
                let listener = TcpListener::bind(SocketAddr::new(*host, 0)).await?;
                let addr = listener.local_addr()?;
                tracing::trace!(%addr, "Bound tcp listener");
                Ok((Self::Tcp(listener), Address::Tcp(addr)))
            }
            #[cfg(unix)]
            TransportKind::Ipc { dir } => {
                let path = dir.join(format!("mli-{}.sock", uuid::Uuid::new_v4().simple()));
                let listener = tokio::net::UnixListener::bind(&path)?;
                tracing::trace!(path = %path.display(), "Bound ipc listener");
                let address = Address::Ipc(path.clone());
                Ok((Self::Ipc(IpcListener { listener, path }), address))
            }
        }
    }

    pub(crate) async fn accept(&self) -> io::Result<Link> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                tracing::trace!(%peer, "Accepted tcp peer");
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Self::Ipc(ipc) => {
                let (stream, _) = ipc.listener.accept().await?;
                tracing::trace!(path = %ipc.path.display(), "Accepted ipc peer");
                Ok(Box::new(stream))
            }
        }
    }
}

/// Unix listener that removes its socket file when dropped.
#[cfg(unix)]
pub(crate) struct IpcListener {
    listener: tokio::net::UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for IpcListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to remove socket file");
        }
    }
}

/// Open a stream to a bound peer.
pub(crate) async fn connect(address: &Address) -> io::Result<Link> {
    match address {
        Address::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Address::Ipc(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            Ok(Box::new(stream))
        }
    }
}
