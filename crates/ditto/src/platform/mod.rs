//! Platform glue for capture, triggers and injection.
//!
//! Raw deltas come from the Windows raw-input channel; only Windows is
//! implemented.

#[cfg(target_os = "windows")]
pub mod windows;
