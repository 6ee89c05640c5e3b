//! Macro playback on a virtual timeline, with cooperative cancellation.

use crate::error::Result;
use crate::events::{Button, Event, EventData, BUTTON_TRANSITIONS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// Shared stop signal. Set once per session and never reset; a new
/// playback session allocates a fresh token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sink for synthesized input. Calls are fire-and-forget; the result is
/// consulted only for logging.
pub trait Injector: Send + Sync {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<()>;
    fn button(&self, button: Button, down: bool) -> Result<()>;
    fn key(&self, code: u32, down: bool) -> Result<()>;
}

impl<T: Injector + ?Sized> Injector for Arc<T> {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<()> {
        (**self).move_relative(dx, dy)
    }

    fn button(&self, button: Button, down: bool) -> Result<()> {
        (**self).button(button, down)
    }

    fn key(&self, code: u32, down: bool) -> Result<()> {
        (**self).key(code, down)
    }
}

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// Wait granularity. Injection timing wants sub-millisecond accuracy, so
/// the scheduler sleeps in short slices instead of one long sleep; the same
/// slice bounds how long a stop signal can go unnoticed. Trades a busy-ish
/// wait for at most ~0.5 ms of overshoot per event.
const POLL: Duration = Duration::from_micros(500);

/// Replays an event sequence so that event `i` is dispatched at
/// `start + t[i] / speed` on the wall clock.
pub struct Player {
    speed: f64,
}

const MIN_SPEED: f64 = 0.01;

impl Player {
    pub fn new() -> Self {
        Self { speed: 1.0 }
    }

    /// Set playback speed (1.0 = real-time, 2.0 = twice as fast).
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed.max(MIN_SPEED);
        self
    }

    /// Play the sequence to completion or until `cancel` is observed.
    /// Partial playback after a stop signal is the expected outcome, not an
    /// error; no event past the cancellation point is dispatched.
    pub fn play(&self, events: &[Event], injector: &dyn Injector, cancel: &CancelToken) -> Outcome {
        let start = Instant::now();
        for event in events {
            let target = start + Duration::from_secs_f64(event.t.max(0.0) / self.speed);
            while Instant::now() < target {
                if cancel.is_cancelled() {
                    return Outcome::Cancelled;
                }
                thread::sleep(POLL);
            }
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            dispatch(event, injector);
        }
        Outcome::Completed
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

/// Send one event to the injector. An individual injection failure never
/// fails the session.
fn dispatch(event: &Event, injector: &dyn Injector) {
    match event.data {
        EventData::Move { dx, dy } => {
            if let Err(e) = injector.move_relative(dx, dy) {
                warn!("move injection failed, continuing: {e}");
            }
        }
        EventData::Button { mask } => {
            for (bit, button, down) in BUTTON_TRANSITIONS {
                if mask & bit != 0 {
                    if let Err(e) = injector.button(button, down) {
                        warn!("button injection failed, continuing: {e}");
                    }
                }
            }
        }
        EventData::Key { code, down } => {
            if let Err(e) = injector.key(code, down) {
                warn!("key injection failed, continuing: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;

    /// Records every injected call instead of synthesizing input.
    #[derive(Default)]
    pub(crate) struct MockInjector {
        pub calls: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl Injector for MockInjector {
        fn move_relative(&self, dx: i32, dy: i32) -> Result<()> {
            self.calls.lock().push(format!("move {dx} {dy}"));
            if self.fail {
                return Err(Error::Injection("mock".into()));
            }
            Ok(())
        }

        fn button(&self, button: Button, down: bool) -> Result<()> {
            self.calls.lock().push(format!("button {button:?} {down}"));
            if self.fail {
                return Err(Error::Injection("mock".into()));
            }
            Ok(())
        }

        fn key(&self, code: u32, down: bool) -> Result<()> {
            self.calls.lock().push(format!("key {code} {down}"));
            if self.fail {
                return Err(Error::Injection("mock".into()));
            }
            Ok(())
        }
    }

    fn quick(events: &[Event]) -> Vec<String> {
        let injector = MockInjector::default();
        let outcome = Player::new().play(events, &injector, &CancelToken::new());
        assert_eq!(outcome, Outcome::Completed);
        injector.calls.into_inner()
    }

    #[test]
    fn dispatches_in_sequence_order() {
        let events = vec![
            Event::new(0.0, EventData::Move { dx: 1, dy: 0 }),
            Event::new(0.001, EventData::Key { code: 65, down: true }),
            Event::new(0.002, EventData::Move { dx: 0, dy: 2 }),
            Event::new(0.002, EventData::Key { code: 65, down: false }),
        ];
        assert_eq!(
            quick(&events),
            vec!["move 1 0", "key 65 true", "move 0 2", "key 65 false"]
        );
    }

    #[test]
    fn combined_mask_decodes_in_fixed_order() {
        // left-down + right-up + middle-down reported in one mask
        let events = vec![Event::new(0.0, EventData::Button { mask: 0x1 | 0x8 | 0x10 })];
        assert_eq!(
            quick(&events),
            vec!["button Left true", "button Right false", "button Middle true"]
        );
    }

    #[test]
    fn zero_mask_is_a_no_op() {
        let events = vec![
            Event::new(0.0, EventData::Button { mask: 0 }),
            Event::new(0.0, EventData::Move { dx: 0, dy: 0 }),
        ];
        // externally-produced no-op events play through without effect
        assert_eq!(quick(&events), vec!["move 0 0"]);
    }

    #[test]
    fn pre_cancelled_token_dispatches_nothing() {
        let events = vec![Event::new(0.0, EventData::Move { dx: 1, dy: 1 })];
        let injector = MockInjector::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = Player::new().play(&events, &injector, &cancel);
        assert_eq!(outcome, Outcome::Cancelled);
        assert!(injector.calls.into_inner().is_empty());
    }

    #[test]
    fn injection_failure_does_not_stop_playback() {
        let events = vec![
            Event::new(0.0, EventData::Move { dx: 1, dy: 0 }),
            Event::new(0.001, EventData::Key { code: 65, down: true }),
        ];
        let injector = MockInjector {
            fail: true,
            ..Default::default()
        };
        let outcome = Player::new().play(&events, &injector, &CancelToken::new());
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(injector.calls.into_inner().len(), 2);
    }
}
