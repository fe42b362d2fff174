//! Unix `SOCK_SEQPACKET` input channel.
//!
//! A sequenced-packet socket preserves record boundaries, so every `send` is
//! exactly one record and every `recv` returns exactly one record.  There is
//! no length prefix on the wire; the kernel does the framing.
//!
//! Both ends are non-blocking and close-on-exec.  Send and receive buffers
//! are sized to [`SOCKET_BUFFER_SIZE`] so a slow consumer exerts back
//! pressure on the producer instead of letting the kernel queue grow.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use motion_core::{decode_message, encode_message, InputMessage, MAX_MESSAGE_SIZE};
use nix::errno::Errno;
use nix::sys::socket::{
    recv, send, setsockopt, socketpair, sockopt, AddressFamily, MsgFlags, SockFlag, SockType,
};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::application::channel::{ChannelError, InputChannel};

/// Kernel send/receive buffer size for both ends.
pub const SOCKET_BUFFER_SIZE: usize = 32 * 1024;

/// One end of a socket-pair input channel.
#[derive(Debug)]
pub struct SocketInputChannel {
    name: String,
    token: Uuid,
    fd: OwnedFd,
    /// One byte larger than the biggest legal record so oversize is detectable.
    recv_buf: Vec<u8>,
}

impl SocketInputChannel {
    /// Creates a connected pair `(producer_end, consumer_end)`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Io`] if the socket pair cannot be created or
    /// configured.
    pub fn open_pair(name: &str) -> Result<(Self, Self), ChannelError> {
        let (producer_fd, consumer_fd) = socketpair(
            AddressFamily::Unix,
            SockType::SeqPacket,
            None,
            SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        )
        .map_err(errno_to_io)?;

        let producer = Self::from_fd(&format!("{name} (producer)"), producer_fd)?;
        let consumer = Self::from_fd(&format!("{name} (consumer)"), consumer_fd)?;
        info!(channel = name, "opened input channel pair");
        Ok((producer, consumer))
    }

    /// Wraps an already connected, non-blocking `SOCK_SEQPACKET` descriptor.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Io`] if the buffer sizes cannot be set.
    pub fn from_fd(name: &str, fd: OwnedFd) -> Result<Self, ChannelError> {
        setsockopt(&fd, sockopt::SndBuf, &SOCKET_BUFFER_SIZE).map_err(errno_to_io)?;
        setsockopt(&fd, sockopt::RcvBuf, &SOCKET_BUFFER_SIZE).map_err(errno_to_io)?;
        let token = Uuid::new_v4();
        debug!(channel = name, %token, fd = fd.as_raw_fd(), "input channel end ready");
        Ok(Self {
            name: name.to_string(),
            token,
            fd,
            recv_buf: vec![0; MAX_MESSAGE_SIZE + 1],
        })
    }

    /// Sends pre-encoded bytes as one record.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::WouldBlock`] if the peer's buffer is full.
    /// - [`ChannelError::Closed`] if the peer hung up.
    /// - [`ChannelError::Io`] for any other failure, including a short send.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), ChannelError> {
        let flags = MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_NOSIGNAL;
        let written = loop {
            match send(self.fd.as_raw_fd(), bytes, flags) {
                Err(Errno::EINTR) => continue,
                other => break other.map_err(map_errno)?,
            }
        };
        if written != bytes.len() {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short send: {written} of {} bytes", bytes.len()),
            )));
        }
        Ok(())
    }

    /// Receives one record as raw bytes.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::WouldBlock`] if no record is waiting.
    /// - [`ChannelError::Closed`] if the peer hung up.
    /// - [`ChannelError::Malformed`] if the record exceeds [`MAX_MESSAGE_SIZE`].
    /// - [`ChannelError::Io`] for any other failure.
    pub fn receive_raw(&mut self) -> Result<&[u8], ChannelError> {
        let n = loop {
            match recv(self.fd.as_raw_fd(), &mut self.recv_buf, MsgFlags::MSG_DONTWAIT) {
                Err(Errno::EINTR) => continue,
                other => break other.map_err(map_errno)?,
            }
        };
        if n == 0 {
            return Err(ChannelError::Closed);
        }
        if n > MAX_MESSAGE_SIZE {
            return Err(ChannelError::Malformed(format!(
                "record exceeds {MAX_MESSAGE_SIZE} bytes"
            )));
        }
        Ok(&self.recv_buf[..n])
    }
}

impl InputChannel for SocketInputChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn token(&self) -> Uuid {
        self.token
    }

    fn send_message(&mut self, msg: &InputMessage) -> Result<(), ChannelError> {
        let bytes = encode_message(msg)?;
        self.send_raw(&bytes)?;
        trace!(channel = %self.name, seq = msg.seq(), kind = ?msg.kind(), "sent record");
        Ok(())
    }

    fn receive_message(&mut self) -> Result<InputMessage, ChannelError> {
        let bytes = self.receive_raw()?;
        Ok(decode_message(bytes)?)
    }

    fn probably_has_input(&self) -> bool {
        let mut probe = [0u8; 1];
        matches!(
            recv(
                self.fd.as_raw_fd(),
                &mut probe,
                MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT,
            ),
            Ok(n) if n > 0
        )
    }

    fn readiness_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Maps a socket errno onto the channel's error vocabulary.
fn map_errno(errno: Errno) -> ChannelError {
    match errno {
        Errno::EAGAIN => ChannelError::WouldBlock,
        Errno::EPIPE | Errno::ECONNRESET | Errno::ECONNREFUSED => ChannelError::Closed,
        other => errno_to_io(other),
    }
}

fn errno_to_io(errno: Errno) -> ChannelError {
    ChannelError::Io(std::io::Error::from(errno))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sent_on_one_end_arrives_on_the_other() {
        // Arrange
        let (mut producer, mut consumer) = SocketInputChannel::open_pair("test").unwrap();
        let msg = InputMessage::timeline(4, 100, 200);

        // Act
        producer.send_message(&msg).unwrap();
        let received = consumer.receive_message().unwrap();

        // Assert
        assert_eq!(received, msg);
    }

    #[test]
    fn test_empty_channel_would_block() {
        let (_producer, mut consumer) = SocketInputChannel::open_pair("test").unwrap();

        assert!(matches!(
            consumer.receive_message(),
            Err(ChannelError::WouldBlock)
        ));
        assert!(!consumer.probably_has_input());
    }

    #[test]
    fn test_probably_has_input_does_not_consume() {
        // Arrange
        let (mut producer, mut consumer) = SocketInputChannel::open_pair("test").unwrap();
        producer
            .send_message(&InputMessage::finished(1, true, 0))
            .unwrap();

        // Act / Assert
        assert!(consumer.probably_has_input());
        assert!(consumer.probably_has_input());
        assert!(consumer.receive_message().is_ok());
        assert!(!consumer.probably_has_input());
    }

    #[test]
    fn test_dropped_peer_reads_as_closed() {
        let (producer, mut consumer) = SocketInputChannel::open_pair("test").unwrap();
        drop(producer);

        assert!(matches!(consumer.receive_message(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_send_to_dropped_peer_is_closed() {
        let (mut producer, consumer) = SocketInputChannel::open_pair("test").unwrap();
        drop(consumer);

        assert!(matches!(
            producer.send_message(&InputMessage::finished(1, true, 0)),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn test_oversized_record_is_malformed() {
        // Arrange
        let (producer, mut consumer) = SocketInputChannel::open_pair("test").unwrap();
        let oversized = vec![0u8; MAX_MESSAGE_SIZE + 8];

        // Act – the kernel may refuse a datagram larger than the send buffer
        let sent = producer.send_raw(&oversized);

        // Assert
        if sent.is_ok() {
            assert!(matches!(
                consumer.receive_message(),
                Err(ChannelError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_garbage_record_is_malformed() {
        let (producer, mut consumer) = SocketInputChannel::open_pair("test").unwrap();
        producer.send_raw(&[0xEE, 1, 2, 3]).unwrap();

        assert!(matches!(
            consumer.receive_message(),
            Err(ChannelError::Malformed(_))
        ));
    }

    #[test]
    fn test_each_end_has_its_own_token() {
        let (producer, consumer) = SocketInputChannel::open_pair("test").unwrap();
        assert_ne!(producer.token(), consumer.token());
        assert!(consumer.name().contains("consumer"));
    }
}
