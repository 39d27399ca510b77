//! A tiny RESP2 client, just enough to run the handful of diagnostic commands
//! an exporter needs (`AUTH`, `PING`, `CONFIG GET`, `INFO`, `SLOWLOG`,
//! `CLIENT LIST`), over plain TCP or TLS.

mod connection;
mod frame;
mod stream;

use std::num::ParseIntError;

pub use connection::Connection;
pub use frame::{Frame, FromFrame, Value};
pub use stream::MaybeTlsStream;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    UnknownCommand(String),

    #[error("server error {0}")]
    Server(String),

    #[error("parse frame failed, {0}")]
    Parse(String),

    #[error("unexpected frame type, want {0}")]
    UnexpectedFrame(&'static str),

    #[error("unknown frame type")]
    UnknownFrameType,

    #[error("timeout")]
    Timeout,
}

#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
            (Error::UnknownCommand(a), Error::UnknownCommand(b)) => a == b,
            (Error::Server(a), Error::Server(b)) => a == b,
            (Error::Parse(a), Error::Parse(b)) => a == b,
            (Error::UnexpectedFrame(a), Error::UnexpectedFrame(b)) => a == b,
            (Error::UnknownFrameType, Error::UnknownFrameType) => true,
            (Error::Timeout, Error::Timeout) => true,
            _ => false,
        }
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::Parse(err.to_string())
    }
}
