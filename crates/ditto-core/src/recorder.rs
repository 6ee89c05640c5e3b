//! Recording session: stamps raw occurrences with elapsed session time.

use crate::events::{Event, EventData};
use std::time::Instant;

/// A raw occurrence from the capture backend, before filtering and
/// timestamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Relative pointer motion
    Motion { dx: i32, dy: i32 },
    /// Button-state-change bitmask, as reported atomically by the device
    Buttons { mask: u32 },
    /// Key transition
    Key { code: u32, down: bool },
}

/// The key codes consumed as control triggers. These are never recorded,
/// press or release, even when they arrive through the generic key channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedKeys {
    pub toggle_record: u32,
    pub start_play: u32,
    pub stop_play: u32,
}

impl ReservedKeys {
    pub fn contains(&self, code: u32) -> bool {
        code == self.toggle_record || code == self.start_play || code == self.stop_play
    }
}

const INITIAL_CAPACITY: usize = 4096;

/// An active recording session. Owns the event buffer until `finish`.
pub struct Recorder {
    started: Instant,
    events: Vec<Event>,
    reserved: ReservedKeys,
}

impl Recorder {
    /// Begin a session now, on the monotonic clock.
    pub fn start(reserved: ReservedKeys) -> Self {
        Self {
            started: Instant::now(),
            events: Vec::with_capacity(INITIAL_CAPACITY),
            reserved,
        }
    }

    /// The session start instant; capture timestamps are measured from it.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Convert one raw occurrence into a timestamped event and append it.
    /// Zero-delta motion, zero masks and reserved key codes are dropped.
    /// Returns whether an event was appended.
    pub fn record(&mut self, at: Instant, input: CaptureEvent) -> bool {
        let data = match input {
            CaptureEvent::Motion { dx: 0, dy: 0 } => return false,
            CaptureEvent::Motion { dx, dy } => EventData::Move { dx, dy },
            CaptureEvent::Buttons { mask: 0 } => return false,
            CaptureEvent::Buttons { mask } => EventData::Button { mask },
            CaptureEvent::Key { code, .. } if self.reserved.contains(code) => return false,
            CaptureEvent::Key { code, down } => EventData::Key { code, down },
        };
        let t = at.saturating_duration_since(self.started).as_secs_f64();
        self.events.push(Event::new(t, data));
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// End the session and hand the buffer to the caller.
    pub fn finish(self) -> Vec<Event> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const RESERVED: ReservedKeys = ReservedKeys {
        toggle_record: 0x78,
        start_play: 0x79,
        stop_play: 0x7b,
    };

    #[test]
    fn zero_delta_motion_is_dropped() {
        let mut rec = Recorder::start(RESERVED);
        assert!(!rec.record(Instant::now(), CaptureEvent::Motion { dx: 0, dy: 0 }));
        assert!(rec.record(Instant::now(), CaptureEvent::Motion { dx: 0, dy: 1 }));
        assert!(rec.record(Instant::now(), CaptureEvent::Motion { dx: -2, dy: 0 }));
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn zero_mask_is_dropped() {
        let mut rec = Recorder::start(RESERVED);
        assert!(!rec.record(Instant::now(), CaptureEvent::Buttons { mask: 0 }));
        assert!(rec.record(Instant::now(), CaptureEvent::Buttons { mask: 0x3 }));
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn reserved_keys_are_never_recorded() {
        let mut rec = Recorder::start(RESERVED);
        for code in [0x78, 0x79, 0x7b] {
            assert!(!rec.record(Instant::now(), CaptureEvent::Key { code, down: true }));
            assert!(!rec.record(Instant::now(), CaptureEvent::Key { code, down: false }));
        }
        assert!(rec.record(Instant::now(), CaptureEvent::Key { code: 0x41, down: true }));
        assert!(rec.record(Instant::now(), CaptureEvent::Key { code: 0x41, down: false }));
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn timestamps_are_relative_and_non_decreasing() {
        let mut rec = Recorder::start(RESERVED);
        let base = rec.started();
        rec.record(base + Duration::from_millis(10), CaptureEvent::Motion { dx: 5, dy: 0 });
        rec.record(base + Duration::from_millis(20), CaptureEvent::Motion { dx: 0, dy: 3 });
        rec.record(base + Duration::from_millis(30), CaptureEvent::Buttons { mask: 0x1 });

        let events = rec.finish();
        assert_eq!(events.len(), 3);
        assert!((events[0].t - 0.01).abs() < 1e-9);
        assert!((events[1].t - 0.02).abs() < 1e-9);
        assert!((events[2].t - 0.03).abs() < 1e-9);
        assert!(events.windows(2).all(|w| w[0].t <= w[1].t));
        assert_eq!(events[0].data, EventData::Move { dx: 5, dy: 0 });
        assert_eq!(events[2].data, EventData::Button { mask: 0x1 });
    }

    #[test]
    fn occurrence_before_session_start_clamps_to_zero() {
        let mut rec = Recorder::start(RESERVED);
        let early = rec.started() - Duration::from_millis(5);
        rec.record(early, CaptureEvent::Motion { dx: 1, dy: 1 });
        assert_eq!(rec.finish()[0].t, 0.0);
    }
}
