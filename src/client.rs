use std::io;
use std::mem;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// State held behind the pending-request slot.
pub(crate) enum ConnState {
    /// No connection: `connect` has not run yet, or `close` has.
    Disconnected,
    /// Connected and ready for the next command.
    Ready(Connection),
    /// A transport or protocol failure, or a command abandoned mid-flight,
    /// invalidated the connection. Commands fail fast until `connect`.
    Poisoned,
}

/// A Redis client over a single connection.
///
/// Any number of tasks may share a `Client` (by reference or by cloning it);
/// the slot guarantees that exactly one command's write+read cycle is in
/// flight at a time, so no caller can ever read another caller's reply.
///
/// ```no_run
/// # use redic::Client;
/// # async fn example() -> redic::Result<()> {
/// let client = Client::new("127.0.0.1", 6379);
/// client.connect().await?;
/// client.set("foo", "42").await?;
/// assert_eq!(client.get("foo").await?.as_deref(), Some(&b"42"[..]));
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    host: String,
    port: u16,
    password: Option<String>,
    /// The pending-request slot. Whoever holds the lock holds the exclusive
    /// right to the next frame off the connection.
    pub(crate) slot: Arc<Mutex<ConnState>>,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16) -> Client {
        Client {
            host: host.into(),
            port,
            password: None,
            slot: Arc::new(Mutex::new(ConnState::Disconnected)),
        }
    }

    /// Sets the password sent as `AUTH` on every subsequent [`connect`].
    ///
    /// [`connect`]: Client::connect
    pub fn password(mut self, password: impl Into<String>) -> Client {
        self.password = Some(password.into());
        self
    }

    /// Opens the transport and authenticates when a password is configured.
    /// Replaces whatever the slot previously held, so this is also the
    /// reconnect path after a failure poisoned the connection.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|err| Error::Connect(err.to_string()))?;
        let mut conn = Connection::new(stream);
        info!(connection_id = %conn.id, host = %self.host, port = self.port, "connected");

        if let Some(password) = &self.password {
            let auth = Frame::command(vec![
                Bytes::from_static(b"AUTH"),
                Bytes::from(password.clone()),
            ]);
            // A rejected AUTH fails the whole connect, not just this command.
            match Self::roundtrip(&mut conn, &auth).await {
                Ok(Frame::Error(message)) => return Err(Error::Connect(message)),
                Ok(_) => {}
                Err(err) => return Err(Error::Connect(err.to_string())),
            }
        }

        *slot = ConnState::Ready(conn);
        Ok(())
    }

    /// Sends a best-effort `QUIT` and releases the connection. Idempotent,
    /// and safe to call from error-recovery paths.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let ConnState::Ready(mut conn) = mem::replace(&mut *slot, ConnState::Disconnected) {
            let quit = Frame::command(vec![Bytes::from_static(b"QUIT")]);
            if conn.write_frame(&quit).await.is_ok() {
                let _ = conn.read_frame().await;
            }
            conn.shutdown().await;
        }
    }

    /// Issues one command and returns its decoded reply.
    ///
    /// The slot is held for the whole write+read cycle, so concurrent callers
    /// queue here and cycles never interleave on the connection. While the
    /// cycle runs the slot reads `Poisoned`: a partially written command
    /// cannot be un-sent, so if this future is dropped mid-cycle (a timeout,
    /// an abandoned task) the connection is torn down instead of being left
    /// in an ambiguous state.
    ///
    /// An `Error` reply from the server surfaces as [`Error::Server`] and
    /// leaves the connection usable. Transport and protocol failures poison
    /// it: later calls fail with [`Error::ConnectionLost`] without touching
    /// the socket, until [`connect`](Client::connect) runs again.
    pub async fn execute(&self, args: Vec<Bytes>) -> Result<Frame> {
        let frame = Frame::command(args);

        let mut slot = self.slot.lock().await;
        let mut conn = match mem::replace(&mut *slot, ConnState::Poisoned) {
            ConnState::Ready(conn) => conn,
            ConnState::Disconnected => {
                *slot = ConnState::Disconnected;
                return Err(Error::ConnectionLost);
            }
            ConnState::Poisoned => return Err(Error::ConnectionLost),
        };

        match Self::roundtrip(&mut conn, &frame).await {
            Ok(Frame::Error(message)) => {
                *slot = ConnState::Ready(conn);
                Err(Error::Server(message))
            }
            Ok(reply) => {
                *slot = ConnState::Ready(conn);
                Ok(reply)
            }
            Err(err) => {
                debug!(connection_id = %conn.id, %err, "command failed, poisoning connection");
                conn.shutdown().await;
                Err(err)
            }
        }
    }

    async fn roundtrip(conn: &mut Connection, frame: &Frame) -> Result<Frame> {
        conn.write_frame(frame).await?;
        match conn.read_frame().await? {
            Some(reply) => Ok(reply),
            None => Err(Error::Transport(io::ErrorKind::UnexpectedEof.into())),
        }
    }

    /// Gets the value of `key`. A missing key is `None`, not an error.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let reply = self
            .execute(vec![Bytes::from_static(b"GET"), bulk(key)])
            .await?;
        match reply {
            Frame::Bulk(value) => Ok(Some(value)),
            Frame::Null => Ok(None),
            reply => Err(unexpected("GET", reply)),
        }
    }

    /// Sets `key` to `value`.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<()> {
        let reply = self
            .execute(vec![Bytes::from_static(b"SET"), bulk(key), value.into()])
            .await?;
        expect_ok("SET", reply)
    }

    /// Sets `key` to `value` with an expiry of `seconds`.
    pub async fn setex(&self, key: &str, seconds: u64, value: impl Into<Bytes>) -> Result<()> {
        let reply = self
            .execute(vec![
                Bytes::from_static(b"SETEX"),
                bulk(key),
                Bytes::from(seconds.to_string()),
                value.into(),
            ])
            .await?;
        expect_ok("SETEX", reply)
    }

    /// Deletes the given keys, returning how many of them existed.
    pub async fn del(&self, keys: &[&str]) -> Result<i64> {
        let mut args = vec![Bytes::from_static(b"DEL")];
        args.extend(keys.iter().map(|key| bulk(key)));

        let reply = self.execute(args).await?;
        match reply {
            Frame::Integer(count) => Ok(count),
            reply => Err(unexpected("DEL", reply)),
        }
    }

    /// Sets an expiry of `seconds` on `key`. Returns whether the key existed.
    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        let reply = self
            .execute(vec![
                Bytes::from_static(b"EXPIRE"),
                bulk(key),
                Bytes::from(seconds.to_string()),
            ])
            .await?;
        match reply {
            Frame::Integer(n) => Ok(n == 1),
            reply => Err(unexpected("EXPIRE", reply)),
        }
    }

    /// Asks the server to echo `message` back.
    pub async fn echo(&self, message: impl Into<Bytes>) -> Result<Bytes> {
        let reply = self
            .execute(vec![Bytes::from_static(b"ECHO"), message.into()])
            .await?;
        match reply {
            Frame::Bulk(message) => Ok(message),
            reply => Err(unexpected("ECHO", reply)),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let reply = self.execute(vec![Bytes::from_static(b"PING")]).await?;
        match reply {
            Frame::Simple(ref s) if s == "PONG" => Ok(()),
            reply => Err(unexpected("PING", reply)),
        }
    }

    /// Removes all keys from the server.
    pub async fn flushall(&self) -> Result<()> {
        let reply = self.execute(vec![Bytes::from_static(b"FLUSHALL")]).await?;
        expect_ok("FLUSHALL", reply)
    }
}

fn bulk(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

fn expect_ok(command: &'static str, reply: Frame) -> Result<()> {
    match reply {
        Frame::Simple(ref s) if s == "OK" => Ok(()),
        reply => Err(unexpected(command, reply)),
    }
}

fn unexpected(command: &'static str, reply: Frame) -> Error {
    Error::UnexpectedReply {
        command,
        reply: reply.to_string(),
    }
}
