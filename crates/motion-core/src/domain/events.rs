//! Non-motion events as delivered to the application.
//!
//! These kinds are never batched or resampled; they are handed to the
//! application as soon as they are received.

use serde::{Deserialize, Serialize};

use crate::domain::motion::{DeviceId, Nanos};

/// Whether a key went down, came up, or repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum KeyAction {
    Down = 0,
    Up = 1,
    Multiple = 2,
}

impl TryFrom<i32> for KeyAction {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeyAction::Down),
            1 => Ok(KeyAction::Up),
            2 => Ok(KeyAction::Multiple),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub device_id: DeviceId,
    pub event_time: Nanos,
    pub action: KeyAction,
    pub key_code: i32,
    pub scan_code: i32,
    pub meta_state: i32,
    pub repeat_count: i32,
    pub down_time: Nanos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusEvent {
    pub event_time: Nanos,
    pub has_focus: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub event_time: Nanos,
    pub pointer_capture_enabled: bool,
}

/// Drag-and-drop location update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragEvent {
    pub event_time: Nanos,
    pub is_exiting: bool,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchModeEvent {
    pub event_time: Nanos,
    pub is_in_touch_mode: bool,
}
