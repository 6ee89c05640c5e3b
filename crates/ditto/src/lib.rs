//! ditto - hotkey-driven raw input macro recorder and player
//!
//! The engine lives in `ditto-core`; this crate supplies the OS-facing
//! collaborators (raw-input capture, the low-level keyboard hook that turns
//! reserved keys into triggers, and SendInput injection) plus the CLI.

pub mod platform;

#[cfg(target_os = "windows")]
pub use platform::windows::{post_quit, vk, MessagePump, SendInputInjector};
