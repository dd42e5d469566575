use bytes::{Buf, BytesMut};
use std::convert::TryInto;
use std::io::Cursor;
use tokio_util::codec::Decoder;

use crate::error::Error;
use crate::frame::{self, Frame};

// Upper bound on a single buffered reply. A server that declares more than
// this is treated as desynchronized rather than as an allocation request.
const MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Incremental reply decoder: drains one complete frame at a time off the
/// read buffer and leaves partial input in place for the next pass. A single
/// socket read may carry several frames (bursts of pub/sub messages); the
/// leftover bytes stay buffered across calls.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() > MAX_FRAME_SIZE {
            return Err(Error::Protocol("reply frame exceeds size limit".to_string()));
        }

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            // Not enough data buffered to parse a frame. The caller reads
            // more bytes and retries from the same position.
            Err(frame::Error::Incomplete) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let position: usize = cursor
            .position()
            .try_into()
            .expect("Cursor position is too large");

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }
}
