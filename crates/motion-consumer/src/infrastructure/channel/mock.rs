//! In-memory input channel for tests.
//!
//! # Why a test channel?
//!
//! The real [`super::SocketInputChannel`] needs a peer process (or thread)
//! writing into the other end, and its timing is up to the kernel.  The
//! `TestInputChannel` replaces the socket with two in-memory queues:
//!
//! - **incoming** – raw encoded records the test wants the consumer to read.
//!   They go through the real decoder, so malformed bytes fail exactly as
//!   they would on a socket.
//! - **sent** – every record the consumer wrote, in order, for assertions.
//!
//! # Usage in tests
//!
//! ```ignore
//! let mut channel = TestInputChannel::new("test");
//! channel.enqueue_message(&key_down)?;
//! let mut consumer = InputConsumer::new(channel, ResamplerFactory::disabled());
//!
//! consumer.handle_receive_callback(&mut callbacks)?;
//! consumer.finish_input_event(1, true)?;
//!
//! consumer.channel_mut().assert_finish_message(1, true);
//! consumer.channel().assert_no_sent_messages();
//! ```
//!
//! # Failure switches
//!
//! `block_sends` makes every send return `WouldBlock`; `close()` makes the
//! channel report `Closed` once the incoming queue is empty.

use std::collections::VecDeque;
use std::os::fd::RawFd;

use motion_core::{decode_message, encode_message, InputMessage, MessageBody, ProtocolError};
use uuid::Uuid;

use crate::application::channel::{ChannelError, InputChannel};

/// An input channel backed by in-memory queues.
#[derive(Debug)]
pub struct TestInputChannel {
    name: String,
    token: Uuid,
    incoming: VecDeque<Vec<u8>>,
    sent: VecDeque<InputMessage>,
    closed: bool,
    /// When `true`, every send returns [`ChannelError::WouldBlock`].
    pub block_sends: bool,
}

impl TestInputChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            token: Uuid::new_v4(),
            incoming: VecDeque::new(),
            sent: VecDeque::new(),
            closed: false,
            block_sends: false,
        }
    }

    /// Queues raw bytes as one record.
    pub fn enqueue_raw(&mut self, bytes: Vec<u8>) {
        self.incoming.push_back(bytes);
    }

    /// Encodes and queues `msg`.
    ///
    /// # Errors
    ///
    /// Whatever [`encode_message`] rejects.
    pub fn enqueue_message(&mut self, msg: &InputMessage) -> Result<(), ProtocolError> {
        self.incoming.push_back(encode_message(msg)?);
        Ok(())
    }

    /// Simulates the producer hanging up after the queued records.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Records sent so far and not yet taken by an assertion.
    pub fn sent_messages(&self) -> impl Iterator<Item = &InputMessage> {
        self.sent.iter()
    }

    /// Removes and returns the oldest sent record.
    pub fn take_sent(&mut self) -> Option<InputMessage> {
        self.sent.pop_front()
    }

    /// Pops the oldest sent record and asserts it finishes `seq` with `handled`.
    ///
    /// # Panics
    ///
    /// If nothing was sent or the record does not match.
    pub fn assert_finish_message(&mut self, seq: u32, handled: bool) {
        let Some(msg) = self.sent.pop_front() else {
            panic!("expected Finished({seq}, handled={handled}), nothing was sent");
        };
        match msg.body {
            MessageBody::Finished { handled: h } => {
                assert_eq!(msg.header.seq, seq, "Finished for the wrong sequence");
                assert_eq!(h, handled, "Finished({seq}) has the wrong handled flag");
            }
            other => panic!("expected Finished({seq}), got {:?}", other.kind()),
        }
    }

    /// Asserts that every sent record has been taken.
    ///
    /// # Panics
    ///
    /// If any sent record is left.
    pub fn assert_no_sent_messages(&self) {
        assert!(
            self.sent.is_empty(),
            "unexpected sent records: {:?}",
            self.sent.iter().map(|m| (m.kind(), m.seq())).collect::<Vec<_>>()
        );
    }
}

impl InputChannel for TestInputChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn token(&self) -> Uuid {
        self.token
    }

    fn send_message(&mut self, msg: &InputMessage) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if self.block_sends {
            return Err(ChannelError::WouldBlock);
        }
        // Round-trip through the codec so unencodable records fail here too.
        let bytes = encode_message(msg)?;
        self.sent.push_back(decode_message(&bytes)?);
        Ok(())
    }

    fn receive_message(&mut self) -> Result<InputMessage, ChannelError> {
        match self.incoming.pop_front() {
            Some(bytes) => Ok(decode_message(&bytes)?),
            None if self.closed => Err(ChannelError::Closed),
            None => Err(ChannelError::WouldBlock),
        }
    }

    fn probably_has_input(&self) -> bool {
        !self.incoming.is_empty()
    }

    fn readiness_fd(&self) -> RawFd {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueued_message_is_received_once() {
        // Arrange
        let mut channel = TestInputChannel::new("test");
        let msg = InputMessage::finished(3, true, 10);
        channel.enqueue_message(&msg).unwrap();

        // Act
        let first = channel.receive_message();
        let second = channel.receive_message();

        // Assert
        assert_eq!(first.unwrap(), msg);
        assert!(matches!(second, Err(ChannelError::WouldBlock)));
    }

    #[test]
    fn test_truncated_raw_record_is_malformed() {
        let mut channel = TestInputChannel::new("test");
        channel.enqueue_raw(vec![0x02, 0, 0]);

        assert!(matches!(
            channel.receive_message(),
            Err(ChannelError::Malformed(_))
        ));
    }

    #[test]
    fn test_closed_channel_reports_closed_after_queue_drains() {
        // Arrange
        let mut channel = TestInputChannel::new("test");
        channel
            .enqueue_message(&InputMessage::finished(1, true, 0))
            .unwrap();
        channel.close();

        // Act / Assert
        assert!(channel.receive_message().is_ok());
        assert!(matches!(channel.receive_message(), Err(ChannelError::Closed)));
        assert!(matches!(
            channel.send_message(&InputMessage::finished(1, true, 0)),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn test_sent_messages_are_asserted_in_order() {
        // Arrange
        let mut channel = TestInputChannel::new("test");

        // Act
        channel.send_message(&InputMessage::finished(1, true, 0)).unwrap();
        channel.send_message(&InputMessage::finished(2, false, 0)).unwrap();

        // Assert
        channel.assert_finish_message(1, true);
        channel.assert_finish_message(2, false);
        channel.assert_no_sent_messages();
    }

    #[test]
    fn test_blocked_sends_would_block() {
        let mut channel = TestInputChannel::new("test");
        channel.block_sends = true;

        assert!(matches!(
            channel.send_message(&InputMessage::finished(1, true, 0)),
            Err(ChannelError::WouldBlock)
        ));
        assert_eq!(channel.sent_messages().count(), 0);
    }

    #[test]
    #[should_panic(expected = "nothing was sent")]
    fn test_assert_finish_message_panics_when_nothing_sent() {
        TestInputChannel::new("test").assert_finish_message(1, true);
    }
}
