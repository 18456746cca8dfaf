use std::{error, fmt, io};

#[derive(Debug)]
pub struct Error(ErrorImpl);

/// The category of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The underlying transport failed.
    Transport,
    /// The peer sent something that does not follow the protocol.
    Protocol,
    /// The server rejected the credentials.
    Auth,
    /// The session cannot proceed with the current configuration.
    Config,
    /// The handshake did not complete in time.
    Timeout,
    /// The session is already closed.
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
enum ErrorImpl {
    #[error("transport error: {0}")]
    Io(#[source] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("handshake timed out")]
    Timeout,

    #[error("disconnected")]
    Disconnected,

    #[error("disconnected by the server: {0}")]
    DisconnectedByServer(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ssh error: {}", self.0)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        error::Error::source(&self.0)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self.0 {
            ErrorImpl::Io(..) => ErrorKind::Transport,
            ErrorImpl::Protocol(..) => ErrorKind::Protocol,
            ErrorImpl::Auth(..) => ErrorKind::Auth,
            ErrorImpl::Config(..) => ErrorKind::Config,
            ErrorImpl::Timeout => ErrorKind::Timeout,
            ErrorImpl::Disconnected | ErrorImpl::DisconnectedByServer(..) => {
                ErrorKind::Disconnected
            }
        }
    }

    /// The reason the server gave for closing the session, if it did.
    pub fn disconnect_reason(&self) -> Option<&str> {
        match self.0 {
            ErrorImpl::DisconnectedByServer(ref reason) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub(crate) fn io(err: io::Error) -> Self {
        Self(ErrorImpl::Io(err))
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self(ErrorImpl::Protocol(msg.into()))
    }

    pub(crate) fn auth(msg: impl Into<String>) -> Self {
        Self(ErrorImpl::Auth(msg.into()))
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self(ErrorImpl::Config(msg.into()))
    }

    pub(crate) fn timeout() -> Self {
        Self(ErrorImpl::Timeout)
    }

    pub(crate) fn disconnected() -> Self {
        Self(ErrorImpl::Disconnected)
    }

    pub(crate) fn disconnected_by_server(reason: impl Into<String>) -> Self {
        Self(ErrorImpl::DisconnectedByServer(reason.into()))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::io(err)
    }
}
