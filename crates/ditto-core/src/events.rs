//! Event types shared by recording, storage and playback.
//!
//! Events are stored as simple structs that serialize to compact JSON lines.

use serde::{Deserialize, Serialize};

/// A single recorded input occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since recording start. Non-decreasing within a macro.
    pub t: f64,
    /// Event type and data
    #[serde(flatten)]
    pub data: EventData,
}

impl Event {
    pub fn new(t: f64, data: EventData) -> Self {
        Self { t, data }
    }
}

/// Event data - simple tagged union
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "e")]
pub enum EventData {
    /// Relative pointer motion: dx, dy
    #[serde(rename = "m")]
    Move { dx: i32, dy: i32 },

    /// Button transitions packed in one mask, as reported by the device
    #[serde(rename = "b")]
    Button { mask: u32 },

    /// Key transition: virtual key code, pressed/released
    #[serde(rename = "k")]
    Key { code: u32, down: bool },
}

/// A named button on the pointing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
    Middle,
}

/// Button-transition mask bits, matching the raw mouse input layout.
/// Bit 0: left down, 1: left up, 2: right down, 3: right up,
/// 4: middle down, 5: middle up.
pub mod button_mask {
    pub const LEFT_DOWN: u32 = 0x0001;
    pub const LEFT_UP: u32 = 0x0002;
    pub const RIGHT_DOWN: u32 = 0x0004;
    pub const RIGHT_UP: u32 = 0x0008;
    pub const MIDDLE_DOWN: u32 = 0x0010;
    pub const MIDDLE_UP: u32 = 0x0020;
}

/// Mask bits paired with the transition they encode, in dispatch order.
/// A mask reporting several transitions at once always decodes in this
/// order, so playback of combined masks is deterministic.
pub const BUTTON_TRANSITIONS: [(u32, Button, bool); 6] = [
    (button_mask::LEFT_DOWN, Button::Left, true),
    (button_mask::LEFT_UP, Button::Left, false),
    (button_mask::RIGHT_DOWN, Button::Right, true),
    (button_mask::RIGHT_UP, Button::Right, false),
    (button_mask::MIDDLE_DOWN, Button::Middle, true),
    (button_mask::MIDDLE_UP, Button::Middle, false),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_move() {
        let event = Event::new(0.01, EventData::Move { dx: 5, dy: -3 });
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn roundtrip_preserves_exact_fields() {
        let events = vec![
            Event::new(0.1 + 0.2, EventData::Move { dx: i32::MIN, dy: i32::MAX }),
            Event::new(1e-9, EventData::Button { mask: 0x0005 }),
            Event::new(86400.125, EventData::Key { code: 0x41, down: false }),
        ];
        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            let back: Event = serde_json::from_str(&json).unwrap();
            assert_eq!(*event, back);
            // f64 timestamps must survive bit-for-bit
            assert_eq!(event.t.to_bits(), back.t.to_bits());
        }
    }

    #[test]
    fn compact_tags() {
        let event = Event::new(0.5, EventData::Key { code: 65, down: true });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""e":"k""#), "unexpected encoding: {json}");
    }

    #[test]
    fn transition_table_covers_all_mask_bits() {
        let all: u32 = BUTTON_TRANSITIONS.iter().map(|(bit, _, _)| bit).sum();
        assert_eq!(all, 0x003f);
    }
}
