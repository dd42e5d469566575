use std::io;
use std::mem;

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

use crate::client::{Client, ConnState};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// A message published to a channel this subscriber listens on.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub channel: String,
    pub payload: Bytes,
}

/// A connection in subscriber mode.
///
/// Entered via [`Client::subscribe`], which consumes the client: once
/// subscribed, the connection carries push messages only and no other
/// command may run on it. There is no way back to command mode — drop the
/// subscriber and connect a fresh client instead.
pub struct Subscriber {
    conn: Connection,
    channels: Vec<String>,
}

impl Client {
    /// Subscribes to the given channels, consuming the client.
    ///
    /// The pending-request slot is held for the remaining lifetime of the
    /// subscription: clones of this client observe [`Error::ConnectionLost`]
    /// until one of them reconnects. One acknowledgement frame per channel is
    /// read and validated before the subscriber is returned.
    pub async fn subscribe(self, channels: &[&str]) -> Result<Subscriber> {
        let mut slot = self.slot.lock().await;
        let mut conn = match mem::replace(&mut *slot, ConnState::Poisoned) {
            ConnState::Ready(conn) => conn,
            ConnState::Disconnected => {
                *slot = ConnState::Disconnected;
                return Err(Error::ConnectionLost);
            }
            ConnState::Poisoned => return Err(Error::ConnectionLost),
        };
        // The connection now belongs to the subscriber; release the slot in
        // its poisoned state so command callers fail fast.
        drop(slot);

        let mut args = vec![Bytes::from_static(b"SUBSCRIBE")];
        args.extend(channels.iter().map(|ch| Bytes::copy_from_slice(ch.as_bytes())));
        conn.write_frame(&Frame::command(args)).await?;

        // The server acknowledges each channel with
        // `["subscribe", <channel>, <subscription-count>]`.
        for channel in channels {
            match conn.read_frame().await? {
                Some(frame) => validate_ack(frame, channel)?,
                None => return Err(Error::Transport(io::ErrorKind::UnexpectedEof.into())),
            }
        }

        debug!(connection_id = %conn.id, ?channels, "entered subscriber mode");

        Ok(Subscriber {
            conn,
            channels: channels.iter().map(|ch| ch.to_string()).collect(),
        })
    }
}

impl Subscriber {
    /// The channels this subscriber was created with.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Waits for the next published message.
    ///
    /// Every frame on a subscribed connection must be a push message; any
    /// other shape is a protocol error and terminates the sequence, as does
    /// the server closing the stream.
    pub async fn next_message(&mut self) -> Result<Message> {
        match self.conn.read_frame().await? {
            Some(frame) => message_from_frame(frame),
            None => Err(Error::Transport(io::ErrorKind::UnexpectedEof.into())),
        }
    }

    /// Adapts the subscriber into a stream of messages. The stream ends at
    /// the first error, dropping the connection with it.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut subscriber = state?;
            match subscriber.next_message().await {
                Ok(message) => Some((Ok(message), Some(subscriber))),
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Closes the connection. Dropping the subscriber has the same effect;
    /// this variant lets the peer observe a clean shutdown.
    pub async fn close(mut self) {
        self.conn.shutdown().await;
    }
}

fn validate_ack(frame: Frame, channel: &str) -> Result<()> {
    if let Frame::Array(items) = &frame {
        if let [Frame::Bulk(kind), Frame::Bulk(subscribed), Frame::Integer(_)] = items.as_slice() {
            if kind.as_ref() == b"subscribe" && subscribed.as_ref() == channel.as_bytes() {
                return Ok(());
            }
        }
    }
    Err(Error::Protocol(format!(
        "unexpected subscribe acknowledgement: {}",
        frame
    )))
}

// Push messages are `["message", <channel>, <payload>]`.
fn message_from_frame(frame: Frame) -> Result<Message> {
    if let Frame::Array(items) = &frame {
        if let [Frame::Bulk(kind), Frame::Bulk(channel), Frame::Bulk(payload)] = items.as_slice() {
            if kind.as_ref() == b"message" {
                return Ok(Message {
                    channel: String::from_utf8_lossy(channel).into_owned(),
                    payload: payload.clone(),
                });
            }
        }
    }
    Err(Error::Protocol(format!(
        "unexpected frame in subscriber mode: {}",
        frame
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_message_frame() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("message")),
            Frame::Bulk(Bytes::from("channel-a")),
            Frame::Bulk(Bytes::from("hello")),
        ]);

        let message = message_from_frame(frame).unwrap();

        assert_eq!(message.channel, "channel-a");
        assert_eq!(message.payload, Bytes::from("hello"));
    }

    #[test]
    fn non_push_frame_is_a_protocol_error() {
        let frame = Frame::Simple("OK".to_string());

        assert!(matches!(
            message_from_frame(frame),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn unsubscribe_shaped_frame_is_a_protocol_error() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("unsubscribe")),
            Frame::Bulk(Bytes::from("channel-a")),
            Frame::Integer(0),
        ]);

        assert!(matches!(
            message_from_frame(frame),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn subscribe_ack_frame() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("subscribe")),
            Frame::Bulk(Bytes::from("channel-a")),
            Frame::Integer(1),
        ]);

        assert!(validate_ack(frame, "channel-a").is_ok());
    }

    #[test]
    fn subscribe_ack_for_wrong_channel() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("subscribe")),
            Frame::Bulk(Bytes::from("channel-b")),
            Frame::Integer(1),
        ]);

        assert!(matches!(
            validate_ack(frame, "channel-a"),
            Err(Error::Protocol(_))
        ));
    }
}
