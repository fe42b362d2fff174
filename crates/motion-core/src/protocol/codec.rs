//! Binary codec for encoding and decoding input channel records.
//!
//! Wire format:
//! ```text
//! [kind:1][seq:4][device_id:4][event_time:8][body:N]
//! ```
//! Total header size: 17 bytes. All multi-byte integers are big-endian and
//! floats are IEEE-754 `f32` in big-endian byte order.
//!
//! The channel is message-oriented, so one datagram carries exactly one
//! record.  [`decode_message`] therefore requires the buffer to be *exactly*
//! as long as the header plus the declared body: short records and trailing
//! bytes are both rejected.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::events::KeyAction;
use crate::domain::motion::{
    AxisId, MotionAction, Pointer, PointerCoords, PointerProperties, ToolType, MAX_POINTERS,
    MAX_POINTER_AXES,
};
use crate::protocol::messages::{
    InputMessage, MessageBody, MessageHeader, MessageKind, HEADER_SIZE, MAX_MESSAGE_SIZE,
};

/// Fixed part of a pointer record: id (4) + tool type (1) + axis count (2).
const POINTER_RECORD_FIXED: usize = 7;
/// One axis entry: axis id (2) + value (4).
const AXIS_ENTRY_SIZE: usize = 6;

/// Errors that can occur during record encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the record it claims to hold.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The kind byte in the header is not a recognized value.
    #[error("unknown record kind: 0x{0:02X}")]
    UnknownMessageKind(u8),

    /// A field value is out of range (unknown action, tool type, duplicate axis…).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Bytes remain after the declared body was fully consumed.
    #[error("trailing bytes: record ends at {expected}, buffer holds {actual}")]
    TrailingBytes { expected: usize, actual: usize },

    /// A motion record declares more pointers than the protocol allows.
    #[error("too many pointers: {0} (max {MAX_POINTERS})")]
    TooManyPointers(usize),

    /// A pointer record declares more axes than the protocol allows.
    #[error("too many axes on one pointer: {0} (max {MAX_POINTER_AXES})")]
    TooManyAxes(usize),

    /// The record exceeds the maximum size of a single datagram.
    #[error("record of {0} bytes exceeds the maximum of {MAX_MESSAGE_SIZE}")]
    MessageTooLarge(usize),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`InputMessage`] into a byte vector including the 17-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError`] if a motion record has no pointers, more than
/// [`MAX_POINTERS`] pointers, a pointer with more than [`MAX_POINTER_AXES`]
/// axes, or if the encoded record would exceed [`MAX_MESSAGE_SIZE`].
///
/// # Examples
///
/// ```rust
/// use motion_core::protocol::{decode_message, encode_message, InputMessage};
///
/// let msg = InputMessage::finished(42, true, 1_000);
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(decode_message(&bytes).unwrap(), msg);
/// ```
pub fn encode_message(msg: &InputMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 32);

    buf.push(msg.kind() as u8);
    buf.extend_from_slice(&msg.header.seq.to_be_bytes());
    buf.extend_from_slice(&msg.header.device_id.to_be_bytes());
    buf.extend_from_slice(&msg.header.event_time.to_be_bytes());

    encode_body(&mut buf, &msg.body)?;

    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(buf.len()));
    }
    Ok(buf)
}

/// Decodes exactly one [`InputMessage`] from `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed, truncated, or longer
/// than the record they contain.
pub fn decode_message(bytes: &[u8]) -> Result<InputMessage, ProtocolError> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(bytes.len()));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let mut reader = WireReader::new(bytes);
    let kind_byte = reader.read_u8()?;
    let kind =
        MessageKind::try_from(kind_byte).map_err(|_| ProtocolError::UnknownMessageKind(kind_byte))?;
    let header = MessageHeader {
        seq: reader.read_u32()?,
        device_id: reader.read_i32()?,
        event_time: reader.read_i64()?,
    };

    let body = decode_body(kind, &mut reader)?;
    reader.finish()?;
    Ok(InputMessage { header, body })
}

// ── Body encoding ─────────────────────────────────────────────────────────────

fn encode_body(buf: &mut Vec<u8>, body: &MessageBody) -> Result<(), ProtocolError> {
    match body {
        MessageBody::Key {
            action,
            key_code,
            scan_code,
            meta_state,
            repeat_count,
            down_time,
        } => {
            buf.extend_from_slice(&(*action as i32).to_be_bytes());
            buf.extend_from_slice(&key_code.to_be_bytes());
            buf.extend_from_slice(&scan_code.to_be_bytes());
            buf.extend_from_slice(&meta_state.to_be_bytes());
            buf.extend_from_slice(&repeat_count.to_be_bytes());
            buf.extend_from_slice(&down_time.to_be_bytes());
        }
        MessageBody::Motion { action, pointers } => encode_motion(buf, *action, pointers)?,
        MessageBody::Finished { handled } => buf.push(u8::from(*handled)),
        MessageBody::Focus { has_focus } => buf.push(u8::from(*has_focus)),
        MessageBody::Capture {
            pointer_capture_enabled,
        } => buf.push(u8::from(*pointer_capture_enabled)),
        MessageBody::Drag { is_exiting, x, y } => {
            buf.push(u8::from(*is_exiting));
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
        }
        MessageBody::TouchMode { is_in_touch_mode } => buf.push(u8::from(*is_in_touch_mode)),
        MessageBody::Timeline {
            gpu_completed_time,
            present_time,
        } => {
            buf.extend_from_slice(&gpu_completed_time.to_be_bytes());
            buf.extend_from_slice(&present_time.to_be_bytes());
        }
    }
    Ok(())
}

fn encode_motion(
    buf: &mut Vec<u8>,
    action: MotionAction,
    pointers: &[Pointer],
) -> Result<(), ProtocolError> {
    if pointers.is_empty() {
        return Err(ProtocolError::MalformedPayload(
            "motion record must carry at least one pointer".to_string(),
        ));
    }
    if pointers.len() > MAX_POINTERS {
        return Err(ProtocolError::TooManyPointers(pointers.len()));
    }

    buf.extend_from_slice(&action.to_raw().to_be_bytes());
    buf.extend_from_slice(&(pointers.len() as u32).to_be_bytes());
    for pointer in pointers {
        let axes = &pointer.coords.axes;
        if axes.len() > MAX_POINTER_AXES {
            return Err(ProtocolError::TooManyAxes(axes.len()));
        }
        buf.extend_from_slice(&pointer.properties.id.to_be_bytes());
        buf.push(pointer.properties.tool_type as u8);
        buf.extend_from_slice(&(axes.len() as u16).to_be_bytes());
        for (axis, value) in axes {
            buf.extend_from_slice(&axis.0.to_be_bytes());
            buf.extend_from_slice(&value.to_be_bytes());
        }
    }
    Ok(())
}

// ── Body decoding ─────────────────────────────────────────────────────────────

fn decode_body(kind: MessageKind, r: &mut WireReader<'_>) -> Result<MessageBody, ProtocolError> {
    match kind {
        MessageKind::Key => {
            let raw_action = r.read_i32()?;
            let action = KeyAction::try_from(raw_action).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown key action: {raw_action}"))
            })?;
            Ok(MessageBody::Key {
                action,
                key_code: r.read_i32()?,
                scan_code: r.read_i32()?,
                meta_state: r.read_i32()?,
                repeat_count: r.read_i32()?,
                down_time: r.read_i64()?,
            })
        }
        MessageKind::Motion => decode_motion(r),
        MessageKind::Finished => Ok(MessageBody::Finished {
            handled: r.read_bool("Finished.handled")?,
        }),
        MessageKind::Focus => Ok(MessageBody::Focus {
            has_focus: r.read_bool("Focus.has_focus")?,
        }),
        MessageKind::Capture => Ok(MessageBody::Capture {
            pointer_capture_enabled: r.read_bool("Capture.pointer_capture_enabled")?,
        }),
        MessageKind::Drag => Ok(MessageBody::Drag {
            is_exiting: r.read_bool("Drag.is_exiting")?,
            x: r.read_f32()?,
            y: r.read_f32()?,
        }),
        MessageKind::TouchMode => Ok(MessageBody::TouchMode {
            is_in_touch_mode: r.read_bool("TouchMode.is_in_touch_mode")?,
        }),
        MessageKind::Timeline => Ok(MessageBody::Timeline {
            gpu_completed_time: r.read_i64()?,
            present_time: r.read_i64()?,
        }),
    }
}

fn decode_motion(r: &mut WireReader<'_>) -> Result<MessageBody, ProtocolError> {
    let raw_action = r.read_i32()?;
    let action = MotionAction::from_raw(raw_action).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!("unknown motion action: 0x{raw_action:08X}"))
    })?;

    let pointer_count = r.read_u32()? as usize;
    if pointer_count == 0 {
        return Err(ProtocolError::MalformedPayload(
            "motion record must carry at least one pointer".to_string(),
        ));
    }
    if pointer_count > MAX_POINTERS {
        return Err(ProtocolError::TooManyPointers(pointer_count));
    }
    // Every pointer needs at least its fixed part; refuse before allocating.
    r.require_remaining(pointer_count * POINTER_RECORD_FIXED, "Motion.pointers")?;

    let mut pointers: Vec<Pointer> = Vec::with_capacity(pointer_count);
    for _ in 0..pointer_count {
        let id = r.read_i32()?;
        let tool_byte = r.read_u8()?;
        let tool_type = ToolType::try_from(tool_byte).map_err(|_| {
            ProtocolError::MalformedPayload(format!("unknown tool type: {tool_byte}"))
        })?;
        if pointers.iter().any(|p| p.properties.id == id) {
            return Err(ProtocolError::MalformedPayload(format!(
                "duplicate pointer id: {id}"
            )));
        }

        let axis_count = r.read_u16()? as usize;
        if axis_count > MAX_POINTER_AXES {
            return Err(ProtocolError::TooManyAxes(axis_count));
        }
        r.require_remaining(axis_count * AXIS_ENTRY_SIZE, "Motion.axes")?;

        let mut axes = BTreeMap::new();
        for _ in 0..axis_count {
            let axis = AxisId(r.read_u16()?);
            let value = r.read_f32()?;
            if axes.insert(axis, value).is_some() {
                return Err(ProtocolError::MalformedPayload(format!(
                    "duplicate axis {} on pointer {id}",
                    axis.0
                )));
            }
        }

        pointers.push(Pointer {
            properties: PointerProperties { id, tool_type },
            coords: PointerCoords {
                axes,
                is_resampled: false,
            },
        });
    }

    if let MotionAction::PointerDown { index } | MotionAction::PointerUp { index } = action {
        if usize::from(index) >= pointer_count {
            return Err(ProtocolError::MalformedPayload(format!(
                "pointer index {index} out of range for {pointer_count} pointers"
            )));
        }
    }

    Ok(MessageBody::Motion { action, pointers })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Bounds-checked big-endian cursor over a received datagram.
struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn require_remaining(&self, needed: usize, context: &str) -> Result<(), ProtocolError> {
        if self.remaining() < needed {
            Err(ProtocolError::MalformedPayload(format!(
                "{context}: need {needed} bytes, got {}",
                self.remaining()
            )))
        } else {
            Ok(())
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let end = self.pos.checked_add(N).filter(|end| *end <= self.buf.len()).ok_or(
            ProtocolError::InsufficientData {
                needed: self.pos.saturating_add(N),
                available: self.buf.len(),
            },
        )?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take::<1>()?[0])
    }

    fn read_bool(&mut self, context: &str) -> Result<bool, ProtocolError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::MalformedPayload(format!(
                "{context}: expected 0 or 1, got {other}"
            ))),
        }
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.take::<8>().map(i64::from_be_bytes)
    }

    fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.take::<4>().map(f32::from_be_bytes)
    }

    /// Fails if any bytes are left unread.
    fn finish(self) -> Result<(), ProtocolError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(ProtocolError::TrailingBytes {
                expected: self.pos,
                actual: self.buf.len(),
            })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::*;

    fn round_trip(msg: &InputMessage) -> InputMessage {
        let encoded = encode_message(msg).expect("encode failed");
        decode_message(&encoded).expect("decode failed")
    }

    fn two_finger_move() -> InputMessage {
        let mut first = Pointer::new(0, ToolType::Finger, 10.5, 20.25);
        first.coords.set_axis(AxisId::PRESSURE, 0.75);
        first.coords.set_axis(AxisId(42), -3.0);
        InputMessage::motion(
            9,
            3,
            16_000_000,
            MotionAction::Move,
            vec![first, Pointer::new(1, ToolType::Stylus, -1.0, 0.0)],
        )
    }

    /// Encodes a single-pointer motion record and lets the caller patch bytes.
    fn encoded_single_pointer() -> Vec<u8> {
        let msg = InputMessage::motion(
            1,
            0,
            5,
            MotionAction::Move,
            vec![Pointer::new(0, ToolType::Finger, 1.0, 2.0)],
        );
        encode_message(&msg).unwrap()
    }

    // Offsets into a motion record.
    const ACTION_OFF: usize = HEADER_SIZE;
    const POINTER_COUNT_OFF: usize = HEADER_SIZE + 4;
    const FIRST_POINTER_OFF: usize = HEADER_SIZE + 8;

    // ── Round trips ───────────────────────────────────────────────────────────

    #[test]
    fn test_motion_with_extra_axes_round_trip() {
        let msg = two_finger_move();
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_key_record_round_trip() {
        let msg = InputMessage {
            header: MessageHeader {
                seq: 1,
                device_id: -1,
                event_time: 123,
            },
            body: MessageBody::Key {
                action: KeyAction::Multiple,
                key_code: 29,
                scan_code: 30,
                meta_state: 0x1000,
                repeat_count: 4,
                down_time: 100,
            },
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_timeline_carries_input_event_id_in_seq() {
        let msg = InputMessage::timeline(77, 1_000, 2_000);
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(u32::from_be_bytes(bytes[1..5].try_into().unwrap()), 77);
        assert_eq!(bytes.len(), HEADER_SIZE + 16);
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    // ── Header layout ─────────────────────────────────────────────────────────

    #[test]
    fn test_header_layout_is_big_endian() {
        // Arrange
        let msg = InputMessage::finished(0x0102_0304, false, 0x1122_3344_5566_7788);

        // Act
        let bytes = encode_message(&msg).unwrap();

        // Assert
        assert_eq!(bytes[0], MessageKind::Finished as u8);
        assert_eq!(&bytes[1..5], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[5..9], &[0, 0, 0, 0]);
        assert_eq!(
            &bytes[9..17],
            &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
        );
        assert_eq!(bytes[17], 0);
        assert_eq!(bytes.len(), HEADER_SIZE + 1);
    }

    #[test]
    fn test_pointer_down_encodes_index_in_second_byte() {
        let msg = InputMessage::motion(
            1,
            0,
            0,
            MotionAction::PointerDown { index: 1 },
            vec![
                Pointer::new(0, ToolType::Finger, 0.0, 0.0),
                Pointer::new(1, ToolType::Finger, 1.0, 1.0),
            ],
        );
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(&bytes[ACTION_OFF..ACTION_OFF + 4], &[0, 0, 0x01, 0x05]);
    }

    // ── Decode failures ───────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_message(&[]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_unknown_kind_returns_error() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0] = 0xFF;
        assert_eq!(
            decode_message(&bytes),
            Err(ProtocolError::UnknownMessageKind(0xFF))
        );
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode_message(&InputMessage::finished(1, true, 0)).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let bytes = encoded_single_pointer();
        let result = decode_message(&bytes[..bytes.len() - 1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pointer_count_beyond_received_bytes_is_malformed() {
        // Arrange: claim 5 pointers while only one is present
        let mut bytes = encoded_single_pointer();
        bytes[POINTER_COUNT_OFF..POINTER_COUNT_OFF + 4].copy_from_slice(&5u32.to_be_bytes());

        // Act
        let result = decode_message(&bytes);

        // Assert
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_pointer_count_above_limit_is_rejected_before_allocation() {
        let mut bytes = encoded_single_pointer();
        bytes[POINTER_COUNT_OFF..POINTER_COUNT_OFF + 4]
            .copy_from_slice(&u32::MAX.to_be_bytes());
        assert_eq!(
            decode_message(&bytes),
            Err(ProtocolError::TooManyPointers(u32::MAX as usize))
        );
    }

    #[test]
    fn test_zero_pointers_is_malformed() {
        let mut bytes = encoded_single_pointer();
        bytes[POINTER_COUNT_OFF..POINTER_COUNT_OFF + 4].copy_from_slice(&0u32.to_be_bytes());
        bytes.truncate(FIRST_POINTER_OFF);
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_axis_count_above_limit_is_rejected() {
        let mut bytes = encoded_single_pointer();
        let axis_count_off = FIRST_POINTER_OFF + 5;
        bytes[axis_count_off..axis_count_off + 2].copy_from_slice(&65u16.to_be_bytes());
        assert_eq!(decode_message(&bytes), Err(ProtocolError::TooManyAxes(65)));
    }

    #[test]
    fn test_duplicate_axis_is_malformed() {
        // Arrange: rewrite the Y axis id (second entry) to X
        let mut bytes = encoded_single_pointer();
        let second_axis_off = FIRST_POINTER_OFF + POINTER_RECORD_FIXED + AXIS_ENTRY_SIZE;
        bytes[second_axis_off..second_axis_off + 2].copy_from_slice(&0u16.to_be_bytes());

        // Act / Assert
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_unknown_tool_type_is_malformed() {
        let mut bytes = encoded_single_pointer();
        bytes[FIRST_POINTER_OFF + 4] = 0x7F;
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_unknown_action_is_malformed() {
        let mut bytes = encoded_single_pointer();
        bytes[ACTION_OFF..ACTION_OFF + 4].copy_from_slice(&0x42i32.to_be_bytes());
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_pointer_index_out_of_range_is_malformed() {
        let mut bytes = encoded_single_pointer();
        let raw = MotionAction::PointerUp { index: 3 }.to_raw();
        bytes[ACTION_OFF..ACTION_OFF + 4].copy_from_slice(&raw.to_be_bytes());
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_non_binary_bool_is_malformed() {
        let mut bytes = encode_message(&InputMessage::finished(1, true, 0)).unwrap();
        bytes[HEADER_SIZE] = 2;
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_oversized_buffer_is_rejected() {
        let bytes = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert_eq!(
            decode_message(&bytes),
            Err(ProtocolError::MessageTooLarge(MAX_MESSAGE_SIZE + 1))
        );
    }

    // ── Encode failures ───────────────────────────────────────────────────────

    #[test]
    fn test_encode_rejects_too_many_pointers() {
        let pointers = (0..=MAX_POINTERS as i32)
            .map(|id| Pointer::new(id, ToolType::Finger, 0.0, 0.0))
            .collect();
        let msg = InputMessage::motion(1, 0, 0, MotionAction::Move, pointers);
        assert_eq!(
            encode_message(&msg),
            Err(ProtocolError::TooManyPointers(MAX_POINTERS + 1))
        );
    }

    #[test]
    fn test_encode_rejects_too_many_axes() {
        let mut pointer = Pointer::new(0, ToolType::Finger, 0.0, 0.0);
        for axis in 0..=MAX_POINTER_AXES as u16 {
            pointer.coords.set_axis(AxisId(axis), 1.0);
        }
        let msg = InputMessage::motion(1, 0, 0, MotionAction::Move, vec![pointer]);
        assert_eq!(
            encode_message(&msg),
            Err(ProtocolError::TooManyAxes(MAX_POINTER_AXES + 1))
        );
    }
}
