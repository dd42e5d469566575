use std::io;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy of the client.
///
/// `Protocol` and `Transport` invalidate the connection: the next command
/// fails with `ConnectionLost` until [`connect`](crate::Client::connect) is
/// called again. `Server` and `UnexpectedReply` leave the connection usable.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The transport could not be established, or the server rejected AUTH.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The reply stream is desynchronized: a malformed frame, an unknown
    /// type tag, or a declared length the stream did not honor. The byte
    /// offset of the next valid frame is unknown, so there is no
    /// resynchronization.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport failed mid-command.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// An error reply from the server, message preserved verbatim.
    #[error("server error: {0}")]
    Server(String),

    /// A previous failure poisoned the connection.
    #[error("connection lost; call connect() before issuing further commands")]
    ConnectionLost,

    /// A well-formed reply whose shape does not match the issued command.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply {
        command: &'static str,
        reply: String,
    },
}
