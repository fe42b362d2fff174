//! All record types carried by the motionlink input channel.
//!
//! Every record starts with the same 17-byte header (kind, sequence number,
//! device id, event time) followed by a kind-specific body.  Event records flow
//! producer → consumer; `Finished` and `Timeline` records flow back.

use serde::{Deserialize, Serialize};

use crate::domain::events::KeyAction;
use crate::domain::motion::{DeviceId, MotionAction, Nanos, Pointer};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Total size of the common record header in bytes.
pub const HEADER_SIZE: usize = 17;

/// Upper bound on the size of a single record, header included.
///
/// A motion record with [`crate::domain::motion::MAX_POINTERS`] pointers, each
/// carrying [`crate::domain::motion::MAX_POINTER_AXES`] axes, fits comfortably.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024;

// ── Record kinds ──────────────────────────────────────────────────────────────

/// Record kind discriminant, the first byte of every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    // Producer → consumer
    Key = 0x01,
    Motion = 0x02,
    // Consumer → producer
    Finished = 0x03,
    // Producer → consumer
    Focus = 0x04,
    Capture = 0x05,
    Drag = 0x06,
    TouchMode = 0x07,
    // Consumer → producer
    Timeline = 0x08,
}

impl MessageKind {
    /// `true` for kinds only the consumer may send.
    pub fn is_consumer_to_producer(self) -> bool {
        matches!(self, MessageKind::Finished | MessageKind::Timeline)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageKind::Key),
            0x02 => Ok(MessageKind::Motion),
            0x03 => Ok(MessageKind::Finished),
            0x04 => Ok(MessageKind::Focus),
            0x05 => Ok(MessageKind::Capture),
            0x06 => Ok(MessageKind::Drag),
            0x07 => Ok(MessageKind::TouchMode),
            0x08 => Ok(MessageKind::Timeline),
            _ => Err(()),
        }
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Fields shared by every record.
///
/// The kind is not stored here; it is derived from the [`MessageBody`] variant
/// so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Producer-assigned sequence number.  For `Finished` it echoes the
    /// sequence being acknowledged; for `Timeline` it is the input event id.
    pub seq: u32,
    pub device_id: DeviceId,
    /// Event time for event records; consume time for `Finished`.
    pub event_time: Nanos,
}

// ── Bodies ────────────────────────────────────────────────────────────────────

/// Kind-specific part of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    Key {
        action: KeyAction,
        key_code: i32,
        scan_code: i32,
        meta_state: i32,
        repeat_count: i32,
        down_time: Nanos,
    },
    Motion {
        action: MotionAction,
        pointers: Vec<Pointer>,
    },
    Finished {
        handled: bool,
    },
    Focus {
        has_focus: bool,
    },
    Capture {
        pointer_capture_enabled: bool,
    },
    Drag {
        is_exiting: bool,
        x: f32,
        y: f32,
    },
    TouchMode {
        is_in_touch_mode: bool,
    },
    Timeline {
        gpu_completed_time: Nanos,
        present_time: Nanos,
    },
}

impl MessageBody {
    /// Returns the wire discriminant for this body.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Key { .. } => MessageKind::Key,
            MessageBody::Motion { .. } => MessageKind::Motion,
            MessageBody::Finished { .. } => MessageKind::Finished,
            MessageBody::Focus { .. } => MessageKind::Focus,
            MessageBody::Capture { .. } => MessageKind::Capture,
            MessageBody::Drag { .. } => MessageKind::Drag,
            MessageBody::TouchMode { .. } => MessageKind::TouchMode,
            MessageBody::Timeline { .. } => MessageKind::Timeline,
        }
    }
}

// ── Top-level record ──────────────────────────────────────────────────────────

/// One record on the input channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl InputMessage {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    /// Builds an acknowledgment for `seq`.
    pub fn finished(seq: u32, handled: bool, consume_time: Nanos) -> Self {
        Self {
            header: MessageHeader {
                seq,
                device_id: 0,
                event_time: consume_time,
            },
            body: MessageBody::Finished { handled },
        }
    }

    /// Builds a graphics timing report for a previously delivered event.
    pub fn timeline(input_event_id: u32, gpu_completed_time: Nanos, present_time: Nanos) -> Self {
        Self {
            header: MessageHeader {
                seq: input_event_id,
                device_id: 0,
                event_time: 0,
            },
            body: MessageBody::Timeline {
                gpu_completed_time,
                present_time,
            },
        }
    }

    /// Builds a motion record.
    pub fn motion(
        seq: u32,
        device_id: DeviceId,
        event_time: Nanos,
        action: MotionAction,
        pointers: Vec<Pointer>,
    ) -> Self {
        Self {
            header: MessageHeader {
                seq,
                device_id,
                event_time,
            },
            body: MessageBody::Motion { action, pointers },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_try_from_rejects_zero_and_unknown() {
        assert_eq!(MessageKind::try_from(0x00), Err(()));
        assert_eq!(MessageKind::try_from(0x09), Err(()));
        assert_eq!(MessageKind::try_from(0x08), Ok(MessageKind::Timeline));
    }

    #[test]
    fn test_finished_and_timeline_are_consumer_to_producer() {
        assert!(MessageKind::Finished.is_consumer_to_producer());
        assert!(MessageKind::Timeline.is_consumer_to_producer());
        assert!(!MessageKind::Motion.is_consumer_to_producer());
    }

    #[test]
    fn test_body_kind_matches_variant() {
        let msg = InputMessage::finished(7, true, 1_000);
        assert_eq!(msg.kind(), MessageKind::Finished);
        assert_eq!(msg.seq(), 7);
    }
}
