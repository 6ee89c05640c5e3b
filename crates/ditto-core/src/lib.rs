//! ditto-core - raw input macro capture, storage and replay
//!
//! Records relative pointer deltas and key transitions with timestamps
//! relative to the recording start, persists them as named macros, and
//! replays them with the same relative timing through an [`Injector`].
//!
//! The OS-facing pieces (raw-input capture, global hotkeys, synthesized
//! input) live in the `ditto` crate; this crate only consumes and produces
//! their interfaces.

pub mod error;
pub mod events;
pub mod playback;
pub mod recorder;
pub mod session;
pub mod storage;

pub use error::{Error, Result};
pub use events::{button_mask, Button, Event, EventData, BUTTON_TRANSITIONS};
pub use playback::{CancelToken, Injector, Outcome, Player};
pub use recorder::{CaptureEvent, Recorder, ReservedKeys};
pub use session::{SessionConfig, SessionController, Trigger};
pub use storage::{MacroStore, MACRO_EXT, PLAYLIST_FILE};

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::events::{Button, Event, EventData};
    pub use crate::playback::{CancelToken, Injector, Outcome, Player};
    pub use crate::recorder::{CaptureEvent, Recorder, ReservedKeys};
    pub use crate::session::{SessionConfig, SessionController, Trigger};
    pub use crate::storage::MacroStore;
}
