//! The input channel port.
//!
//! The consumption loop talks to the producer through [`InputChannel`].  The
//! real implementation is a Unix `SOCK_SEQPACKET` socket
//! (`infrastructure::channel::socket`); tests use an in-memory double
//! (`infrastructure::channel::mock`) or the `mockall` mock generated here.

use std::os::fd::RawFd;

use motion_core::{InputMessage, ProtocolError};
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by an [`InputChannel`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer hung up.  Fatal for the channel.
    #[error("channel closed by peer")]
    Closed,

    /// A record violated the wire format.  Fatal for the channel.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Nothing to read, or the send buffer is full.  Retry later.
    #[error("operation would block")]
    WouldBlock,

    /// Any other OS error on the descriptor.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for ChannelError {
    fn from(err: ProtocolError) -> Self {
        ChannelError::Malformed(err.to_string())
    }
}

impl ChannelError {
    /// `true` for errors after which the channel must not be used again.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::WouldBlock)
    }
}

/// One end of a record-oriented, non-blocking input channel.
///
/// Every call returns immediately; "no data yet" and "buffer full" are both
/// reported as [`ChannelError::WouldBlock`].
#[cfg_attr(test, mockall::automock)]
pub trait InputChannel {
    /// Human-readable channel name used in log lines.
    fn name(&self) -> &str;

    /// Random identifier of this channel instance.
    fn token(&self) -> Uuid;

    /// Sends one record.
    fn send_message(&mut self, msg: &InputMessage) -> Result<(), ChannelError>;

    /// Receives one record without blocking.
    fn receive_message(&mut self) -> Result<InputMessage, ChannelError>;

    /// Peeks whether a record is waiting, without consuming it.
    fn probably_has_input(&self) -> bool;

    /// Descriptor that becomes readable when a record arrives.
    fn readiness_fd(&self) -> RawFd;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_converts_to_malformed() {
        // Arrange
        let err = ProtocolError::UnknownMessageKind(0x7F);

        // Act
        let channel_err = ChannelError::from(err);

        // Assert
        assert!(matches!(channel_err, ChannelError::Malformed(ref m) if m.contains("0x7F")));
    }

    #[test]
    fn test_only_would_block_is_not_fatal() {
        assert!(!ChannelError::WouldBlock.is_fatal());
        assert!(ChannelError::Closed.is_fatal());
        assert!(ChannelError::Malformed("x".into()).is_fatal());
        assert!(ChannelError::Io(std::io::Error::other("boom")).is_fatal());
    }
}
