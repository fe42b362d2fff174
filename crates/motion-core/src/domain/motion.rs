//! Motion domain model: pointers, samples, actions, and delivered events.
//!
//! # Samples and history (for beginners)
//!
//! A touch screen or mouse reports its state many times per second.  Each
//! report is a *sample*: one timestamp plus the position of every pointer
//! (finger, stylus tip, cursor) that is currently down.  Because the producer
//! samples faster than the consumer renders, several samples are grouped into
//! a single [`MotionEvent`]; the older samples form the event's *history* and
//! the newest sample is the event's current position.
//!
//! A sample may be *resampled*: synthesized by the consumer rather than
//! measured by the hardware.  Only the last sample of a delivered event can be
//! resampled, and it is flagged per pointer with
//! [`PointerCoords::is_resampled`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Monotonic event time in nanoseconds.
pub type Nanos = i64;

/// Identifier of the physical or virtual device that produced an event.
pub type DeviceId = i32;

/// Maximum number of pointers a single motion record may carry.
pub const MAX_POINTERS: usize = 16;

/// Maximum number of axes a single pointer may carry.
pub const MAX_POINTER_AXES: usize = 64;

// ── Axes ──────────────────────────────────────────────────────────────────────

/// Identifier of a per-pointer axis.
///
/// Only [`AxisId::X`] and [`AxisId::Y`] are ever predicted by the resampler.
/// Any other id is carried through untouched, including ids this crate does not
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AxisId(pub u16);

impl AxisId {
    pub const X: AxisId = AxisId(0);
    pub const Y: AxisId = AxisId(1);
    pub const PRESSURE: AxisId = AxisId(2);
    pub const SIZE: AxisId = AxisId(3);
    pub const TOUCH_MAJOR: AxisId = AxisId(4);
    pub const TOUCH_MINOR: AxisId = AxisId(5);
    pub const TOOL_MAJOR: AxisId = AxisId(6);
    pub const TOOL_MINOR: AxisId = AxisId(7);
    pub const ORIENTATION: AxisId = AxisId(8);
    pub const VSCROLL: AxisId = AxisId(9);
    pub const HSCROLL: AxisId = AxisId(10);
}

// ── Tool types ────────────────────────────────────────────────────────────────

/// Classification of the contact source behind a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ToolType {
    Unknown = 0x00,
    Finger = 0x01,
    Stylus = 0x02,
    Mouse = 0x03,
    Eraser = 0x04,
    Palm = 0x05,
}

impl ToolType {
    /// Whether pointers of this tool type may be predicted.
    ///
    /// Palm and eraser contacts are coarse and jittery; a single such pointer
    /// disables resampling for the whole event.
    pub fn can_resample(self) -> bool {
        matches!(
            self,
            ToolType::Finger | ToolType::Stylus | ToolType::Mouse | ToolType::Unknown
        )
    }
}

impl TryFrom<u8> for ToolType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ToolType::Unknown),
            0x01 => Ok(ToolType::Finger),
            0x02 => Ok(ToolType::Stylus),
            0x03 => Ok(ToolType::Mouse),
            0x04 => Ok(ToolType::Eraser),
            0x05 => Ok(ToolType::Palm),
            _ => Err(()),
        }
    }
}

// ── Actions ───────────────────────────────────────────────────────────────────

const ACTION_MASK: i32 = 0xFF;
const ACTION_POINTER_INDEX_SHIFT: u32 = 8;
const ACTION_POINTER_INDEX_MASK: i32 = 0xFF00;

/// What happened in a motion sample.
///
/// On the wire the action is an `i32` whose low byte is the action code and,
/// for `PointerDown` / `PointerUp`, whose second byte is the index of the
/// pointer that went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionAction {
    Down,
    Up,
    Move,
    Cancel,
    PointerDown { index: u8 },
    PointerUp { index: u8 },
    HoverMove,
    Scroll,
    HoverEnter,
    HoverExit,
}

impl MotionAction {
    /// Encodes the action into its wire representation.
    pub fn to_raw(self) -> i32 {
        match self {
            MotionAction::Down => 0,
            MotionAction::Up => 1,
            MotionAction::Move => 2,
            MotionAction::Cancel => 3,
            MotionAction::PointerDown { index } => {
                5 | (i32::from(index) << ACTION_POINTER_INDEX_SHIFT)
            }
            MotionAction::PointerUp { index } => 6 | (i32::from(index) << ACTION_POINTER_INDEX_SHIFT),
            MotionAction::HoverMove => 7,
            MotionAction::Scroll => 8,
            MotionAction::HoverEnter => 9,
            MotionAction::HoverExit => 10,
        }
    }

    /// Decodes a wire action, rejecting unknown codes and stray index bits.
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw & !(ACTION_MASK | ACTION_POINTER_INDEX_MASK) != 0 {
            return None;
        }
        let index = ((raw & ACTION_POINTER_INDEX_MASK) >> ACTION_POINTER_INDEX_SHIFT) as u8;
        let action = match raw & ACTION_MASK {
            0 => MotionAction::Down,
            1 => MotionAction::Up,
            2 => MotionAction::Move,
            3 => MotionAction::Cancel,
            5 => return Some(MotionAction::PointerDown { index }),
            6 => return Some(MotionAction::PointerUp { index }),
            7 => MotionAction::HoverMove,
            8 => MotionAction::Scroll,
            9 => MotionAction::HoverEnter,
            10 => MotionAction::HoverExit,
            _ => return None,
        };
        // Only pointer actions may carry an index.
        (index == 0).then_some(action)
    }

    /// `true` for MOVE and HOVER_MOVE, the only actions that are batched.
    pub fn is_batchable(self) -> bool {
        matches!(self, MotionAction::Move | MotionAction::HoverMove)
    }

    /// `true` for actions that open a gesture on a device.
    pub fn starts_gesture(self) -> bool {
        matches!(self, MotionAction::Down | MotionAction::HoverEnter)
    }

    /// `true` for actions after which the device has no active gesture.
    pub fn ends_gesture(self) -> bool {
        matches!(
            self,
            MotionAction::Up | MotionAction::Cancel | MotionAction::HoverExit
        )
    }

    /// `true` for actions that add or remove one pointer mid-gesture.
    pub fn changes_pointer_count(self) -> bool {
        matches!(
            self,
            MotionAction::PointerDown { .. } | MotionAction::PointerUp { .. }
        )
    }
}

// ── Pointers ──────────────────────────────────────────────────────────────────

/// Identity of a pointer within a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerProperties {
    /// Stable id for as long as the contact stays down.
    pub id: i32,
    pub tool_type: ToolType,
}

/// Axis values for one pointer in one sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerCoords {
    /// Axis values keyed by axis id, iterated in ascending id order.
    pub axes: BTreeMap<AxisId, f32>,
    /// `true` when X/Y were synthesized by the resampler.
    pub is_resampled: bool,
}

impl PointerCoords {
    /// Creates real (not resampled) coordinates with only X and Y set.
    pub fn with_xy(x: f32, y: f32) -> Self {
        let mut coords = Self::default();
        coords.set_axis(AxisId::X, x);
        coords.set_axis(AxisId::Y, y);
        coords
    }

    /// Returns the value of `axis`, or `0.0` when the axis is absent.
    pub fn axis(&self, axis: AxisId) -> f32 {
        self.axes.get(&axis).copied().unwrap_or(0.0)
    }

    pub fn set_axis(&mut self, axis: AxisId, value: f32) {
        self.axes.insert(axis, value);
    }

    pub fn x(&self) -> f32 {
        self.axis(AxisId::X)
    }

    pub fn y(&self) -> f32 {
        self.axis(AxisId::Y)
    }

    /// Exact (bitwise-value) equality of X and Y.
    pub fn same_xy(&self, other: &PointerCoords) -> bool {
        self.x() == other.x() && self.y() == other.y()
    }
}

/// One pointer in one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    pub properties: PointerProperties,
    pub coords: PointerCoords,
}

impl Pointer {
    /// Convenience constructor for a real pointer with only X/Y axes.
    pub fn new(id: i32, tool_type: ToolType, x: f32, y: f32) -> Self {
        Self {
            properties: PointerProperties { id, tool_type },
            coords: PointerCoords::with_xy(x, y),
        }
    }

    pub fn id(&self) -> i32 {
        self.properties.id
    }
}

// ── Samples ───────────────────────────────────────────────────────────────────

/// One instant of a motion event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub event_time: Nanos,
    /// Pointers in producer order.
    pub pointers: Vec<Pointer>,
}

impl MotionSample {
    pub fn new(event_time: Nanos, pointers: Vec<Pointer>) -> Self {
        Self {
            event_time,
            pointers,
        }
    }

    /// Looks up a pointer by id.
    pub fn pointer(&self, id: i32) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.properties.id == id)
    }

    /// Pointer ids in ascending order.
    pub fn pointer_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.pointers.iter().map(Pointer::id).collect();
        ids.sort_unstable();
        ids
    }

    /// `true` when both samples contain exactly the same pointer ids, in any
    /// order.
    pub fn same_pointer_ids(&self, other: &MotionSample) -> bool {
        self.pointers.len() == other.pointers.len() && self.pointer_ids() == other.pointer_ids()
    }

    /// `true` when any pointer in this sample was synthesized.
    pub fn is_resampled(&self) -> bool {
        self.pointers.iter().any(|p| p.coords.is_resampled)
    }
}

// ── Delivered events ──────────────────────────────────────────────────────────

/// A motion event as handed to the application: one action plus an ordered
/// sample history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub device_id: DeviceId,
    pub action: MotionAction,
    pub samples: Vec<MotionSample>,
}

impl MotionEvent {
    /// Creates a single-sample event.
    pub fn new(device_id: DeviceId, action: MotionAction, sample: MotionSample) -> Self {
        Self {
            device_id,
            action,
            samples: vec![sample],
        }
    }

    /// Event time of the newest sample, or `None` for an empty event.
    pub fn event_time(&self) -> Option<Nanos> {
        self.samples.last().map(|s| s.event_time)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples before the newest one.
    pub fn history_size(&self) -> usize {
        self.samples.len().saturating_sub(1)
    }

    pub fn last_sample(&self) -> Option<&MotionSample> {
        self.samples.last()
    }

    pub fn pointer_count(&self) -> usize {
        self.samples.first().map_or(0, |s| s.pointers.len())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_actions_round_trip_through_raw_with_index() {
        for action in [
            MotionAction::PointerDown { index: 3 },
            MotionAction::PointerUp { index: 0 },
            MotionAction::HoverExit,
        ] {
            assert_eq!(MotionAction::from_raw(action.to_raw()), Some(action));
        }
        assert_eq!(MotionAction::PointerDown { index: 1 }.to_raw(), 0x0105);
    }

    #[test]
    fn test_from_raw_rejects_unknown_code() {
        // 4 (OUTSIDE) is not part of this protocol.
        assert_eq!(MotionAction::from_raw(4), None);
        assert_eq!(MotionAction::from_raw(0x7F), None);
    }

    #[test]
    fn test_from_raw_rejects_index_on_non_pointer_action() {
        assert_eq!(MotionAction::from_raw(0x0102), None);
    }

    #[test]
    fn test_from_raw_rejects_high_bits() {
        assert_eq!(MotionAction::from_raw(0x0001_0002), None);
        assert_eq!(MotionAction::from_raw(-1), None);
    }

    #[test]
    fn test_palm_and_eraser_cannot_be_resampled() {
        assert!(!ToolType::Palm.can_resample());
        assert!(!ToolType::Eraser.can_resample());
        assert!(ToolType::Finger.can_resample());
        assert!(ToolType::Unknown.can_resample());
    }

    #[test]
    fn test_same_pointer_ids_ignores_order() {
        let a = MotionSample::new(
            0,
            vec![
                Pointer::new(0, ToolType::Finger, 1.0, 1.0),
                Pointer::new(1, ToolType::Finger, 2.0, 2.0),
            ],
        );
        let b = MotionSample::new(
            5,
            vec![
                Pointer::new(1, ToolType::Finger, 2.0, 2.0),
                Pointer::new(0, ToolType::Finger, 1.0, 1.0),
            ],
        );
        let c = MotionSample::new(10, vec![Pointer::new(0, ToolType::Finger, 1.0, 1.0)]);

        assert!(a.same_pointer_ids(&b));
        assert!(!a.same_pointer_ids(&c));
    }

    #[test]
    fn test_missing_axis_reads_as_zero() {
        let coords = PointerCoords::with_xy(3.0, 4.0);
        assert_eq!(coords.axis(AxisId::PRESSURE), 0.0);
        assert_eq!(coords.x(), 3.0);
        assert!(!coords.is_resampled);
    }
}
