//! Session control: at most one recording and one playback at a time,
//! toggled by hotkey triggers delivered from arbitrary threads.

use crate::events::Event;
use crate::playback::{CancelToken, Injector, Outcome, Player};
use crate::recorder::{CaptureEvent, Recorder, ReservedKeys};
use crate::storage::MacroStore;
use crate::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A control signal from the hotkey collaborator. Delivery is at-most-once
/// per physical key press; edge detection is the collaborator's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ToggleRecord,
    StartPlay,
    StopPlay,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Playback speed factor (1.0 = real-time).
    pub speed: f64,
    /// Key codes reserved as triggers; never recorded.
    pub reserved: ReservedKeys,
    /// Pause between playlist entries, applied to skipped entries as well
    /// so a playlist of only missing macros cannot spin hot.
    pub pause_between: Duration,
}

impl SessionConfig {
    pub fn new(reserved: ReservedKeys) -> Self {
        Self {
            speed: 1.0,
            reserved,
            pause_between: Duration::from_millis(100),
        }
    }
}

/// The single process-wide session mode.
enum Mode {
    Idle,
    Recording(Recorder),
    Playing { cancel: CancelToken },
}

/// Gates the recorder and the playback scheduler behind atomic mode
/// transitions. Shared across the capture pump thread, the trigger thread
/// and the playback worker.
pub struct SessionController<I> {
    mode: Mutex<Mode>,
    store: Arc<MacroStore>,
    injector: Arc<I>,
    config: SessionConfig,
    // One worker slot each; a fresh worker joins its predecessor so two
    // workers of the same kind never run concurrently.
    save_slot: Mutex<Option<JoinHandle<()>>>,
    play_slot: Mutex<Option<JoinHandle<()>>>,
}

impl<I: Injector + 'static> SessionController<I> {
    pub fn new(store: MacroStore, injector: I, config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(Mode::Idle),
            store: Arc::new(store),
            injector: Arc::new(injector),
            config,
            save_slot: Mutex::new(None),
            play_slot: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &MacroStore {
        &self.store
    }

    pub fn is_recording(&self) -> bool {
        matches!(*self.mode.lock(), Mode::Recording(_))
    }

    pub fn is_playing(&self) -> bool {
        matches!(*self.mode.lock(), Mode::Playing { .. })
    }

    /// Dispatch one trigger signal.
    pub fn handle(self: &Arc<Self>, trigger: Trigger) {
        match trigger {
            Trigger::ToggleRecord => self.toggle_record(),
            Trigger::StartPlay => self.start_play(),
            Trigger::StopPlay => self.stop_play(),
        }
    }

    /// Deliver one raw occurrence from the capture pump. Appends inline on
    /// the delivering thread while a recording is active, otherwise drops.
    pub fn capture(&self, at: Instant, input: CaptureEvent) {
        if let Mode::Recording(recorder) = &mut *self.mode.lock() {
            recorder.record(at, input);
        }
    }

    fn toggle_record(&self) {
        let mut mode = self.mode.lock();
        match std::mem::replace(&mut *mode, Mode::Idle) {
            Mode::Idle => {
                *mode = Mode::Recording(Recorder::start(self.config.reserved));
                info!("recording started");
            }
            Mode::Recording(recorder) => {
                // mode is already Idle again; new triggers are accepted
                // without waiting for the save below.
                drop(mode);
                let events = recorder.finish();
                info!("recording stopped ({} events)", events.len());
                self.spawn_save(events);
            }
            playing @ Mode::Playing { .. } => {
                *mode = playing;
                debug!("record trigger ignored while playing");
            }
        }
    }

    fn spawn_save(&self, events: Vec<Event>) {
        let store = Arc::clone(&self.store);
        let previous = self.save_slot.lock().take();
        let handle = thread::spawn(move || {
            if let Some(h) = previous {
                let _ = h.join();
            }
            match store.save_new(&events) {
                Ok(name) => info!("saved {name} ({} events)", events.len()),
                Err(e) => error!("failed to save recording: {e}"),
            }
        });
        *self.save_slot.lock() = Some(handle);
    }

    fn start_play(self: &Arc<Self>) {
        let mut mode = self.mode.lock();
        match &*mode {
            Mode::Idle => {}
            Mode::Playing { .. } => {
                debug!("play trigger ignored, already playing");
                return;
            }
            Mode::Recording(_) => {
                debug!("play trigger ignored while recording");
                return;
            }
        }

        // each session gets a fresh token; a stale one would already be set
        let cancel = CancelToken::new();
        *mode = Mode::Playing {
            cancel: cancel.clone(),
        };
        drop(mode);

        let this = Arc::clone(self);
        let previous = self.play_slot.lock().take();
        let handle = thread::spawn(move || {
            if let Some(h) = previous {
                let _ = h.join();
            }
            this.run_playlist(cancel);
        });
        *self.play_slot.lock() = Some(handle);
    }

    fn stop_play(&self) {
        match &*self.mode.lock() {
            Mode::Playing { cancel } => {
                info!("stopping playback");
                cancel.cancel();
            }
            _ => debug!("stop trigger ignored, not playing"),
        }
    }

    /// Playback worker body: cycle through the playlist until it is empty
    /// or a stop is requested. The playlist file is re-read before every
    /// entry so external edits take effect between entries.
    fn run_playlist(&self, cancel: CancelToken) {
        let player = Player::new().speed(self.config.speed);
        let mut cursor = 0usize;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let playlist = self.store.list_playlist();
            if playlist.is_empty() {
                info!("playlist is empty, stopping playback");
                break;
            }
            let name = playlist[cursor % playlist.len()].clone();
            cursor = (cursor + 1) % playlist.len();

            match self.store.load(&name) {
                Ok(events) => {
                    info!("playing {name} ({} events)", events.len());
                    match player.play(&events, self.injector.as_ref(), &cancel) {
                        Outcome::Completed => info!("finished {name}"),
                        Outcome::Cancelled => break,
                    }
                }
                Err(e @ Error::Corrupt { .. }) => error!("skipping {name}: {e}"),
                Err(e) => warn!("skipping {name}: {e}"),
            }
            thread::sleep(self.config.pause_between);
        }

        *self.mode.lock() = Mode::Idle;
        info!("playback stopped");
    }

    /// Cancel any running playback, discard an unfinished recording and
    /// wait for both worker slots to drain.
    pub fn shutdown(&self) {
        self.stop_play();
        {
            let mut mode = self.mode.lock();
            if matches!(*mode, Mode::Recording(_)) {
                if let Mode::Recording(recorder) = std::mem::replace(&mut *mode, Mode::Idle) {
                    warn!("discarding unfinished recording ({} events)", recorder.len());
                }
            }
        }
        for slot in [&self.play_slot, &self.save_slot] {
            let handle = slot.lock().take();
            if let Some(h) = handle {
                let _ = h.join();
            }
        }
    }
}
