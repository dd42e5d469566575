use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;
use tracing::debug;
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Owns the transport stream and its read buffer. Nothing else in the crate
/// touches raw bytes: callers exchange `Frame`s only.
pub struct Connection {
    stream: TcpStream,
    // Data is read from the socket into the read buffer. When a frame is
    // parsed, the corresponding data is removed from the buffer.
    buffer: BytesMut,
    codec: FrameCodec,
    pub(crate) id: Uuid,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection {
            stream,
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
            codec: FrameCodec,
            id: Uuid::new_v4(),
        }
    }

    /// Reads a single reply frame, suspending on the socket as many times as
    /// needed. Returns `Ok(None)` when the peer closed the stream at a frame
    /// boundary. A close in the middle of a frame is a protocol error: the
    /// frame header declared more data than the stream delivered.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Protocol(
                    "stream closed in the middle of a frame".to_string(),
                ));
            }
        }
    }

    /// Writes the full wire encoding of `frame` and flushes it. No partial
    /// write ever leaks to the caller.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_all(&frame.serialize()).await
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Closes the write half so the peer observes a clean shutdown. Dropping
    /// the connection releases the socket either way.
    pub async fn shutdown(&mut self) {
        debug!(connection_id = %self.id, "closing connection");
        let _ = self.stream.shutdown().await;
    }
}
