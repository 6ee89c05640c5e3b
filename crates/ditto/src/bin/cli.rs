//! ditto CLI
//!
//! `ditto run` is the hotkey daemon: F9 starts/stops recording, F10 starts
//! playlist playback, F12 stops it. The remaining subcommands manage the
//! macro directory.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ditto_core::{EventData, MacroStore, MACRO_EXT};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ditto")]
#[command(about = "Record raw pointer deltas and keys, replay them as macros")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hotkey daemon (F9 record, F10 play, F12 stop playback)
    Run {
        /// Directory holding macros and the playlist file
        #[arg(short, long, default_value = "macros")]
        dir: PathBuf,
        /// Playback speed factor (1.0 = real-time)
        #[arg(short, long, default_value = "1.0")]
        speed: f64,
    },
    /// Play a single macro once
    Play {
        name: String,
        #[arg(short, long, default_value = "macros")]
        dir: PathBuf,
        #[arg(short, long, default_value = "1.0")]
        speed: f64,
    },
    /// List saved macros
    List {
        #[arg(short, long, default_value = "macros")]
        dir: PathBuf,
    },
    /// Show a macro's event summary
    Show {
        name: String,
        #[arg(short, long, default_value = "macros")]
        dir: PathBuf,
        /// Dump every event
        #[arg(long)]
        all: bool,
    },
    /// Delete a macro
    Delete {
        name: String,
        #[arg(short, long, default_value = "macros")]
        dir: PathBuf,
    },
    /// Drop the trailing fraction of a macro, saving the rest as a new one
    Trim {
        name: String,
        /// Fraction of trailing events to remove (0.0 - 1.0)
        #[arg(short, long, default_value = "0.1")]
        percent: f64,
        /// Output filename (defaults to `<name>_trimmed`)
        #[arg(short, long)]
        output: Option<String>,
        #[arg(short, long, default_value = "macros")]
        dir: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { dir, speed } => run(dir, speed),
        Commands::Play { name, dir, speed } => play(&name, dir, speed),
        Commands::List { dir } => list(dir),
        Commands::Show { name, dir, all } => show(&name, dir, all),
        Commands::Delete { name, dir } => delete(&name, dir),
        Commands::Trim {
            name,
            percent,
            output,
            dir,
        } => trim(&name, percent, output, dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// ── Daemon (Windows) ────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
fn run(dir: PathBuf, speed: f64) -> Result<()> {
    use ditto::platform::windows::{post_quit, vk, MessagePump, SendInputInjector};
    use ditto_core::{ReservedKeys, SessionConfig, SessionController};
    use std::sync::Arc;

    let store = MacroStore::new(&dir)?;
    let reserved = ReservedKeys {
        toggle_record: vk::F9,
        start_play: vk::F10,
        stop_play: vk::F12,
    };
    let mut config = SessionConfig::new(reserved);
    config.speed = speed;
    let controller = SessionController::new(store, SendInputInjector, config);

    // triggers leave the hook thread immediately and are handled here
    let (tx, rx) = crossbeam_channel::unbounded();
    let trigger_controller = Arc::clone(&controller);
    std::thread::spawn(move || {
        for trigger in rx {
            trigger_controller.handle(trigger);
        }
    });

    let capture_controller = Arc::clone(&controller);
    let pump = MessagePump::new(
        reserved,
        move |at, input| capture_controller.capture(at, input),
        tx,
    )?;

    let thread_id = pump.thread_id();
    let shutdown_controller = Arc::clone(&controller);
    ctrlc::set_handler(move || {
        shutdown_controller.shutdown();
        post_quit(thread_id);
    })?;

    println!("ditto ready: F9 = start/stop recording, F10 = play, F12 = stop playback.");
    println!("Macros live in {}. Ctrl+C quits.", dir.display());
    pump.run();
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn run(_dir: PathBuf, _speed: f64) -> Result<()> {
    anyhow::bail!("the hotkey daemon needs raw input and SendInput; it runs on Windows only")
}

#[cfg(target_os = "windows")]
fn play(name: &str, dir: PathBuf, speed: f64) -> Result<()> {
    use ditto::platform::windows::SendInputInjector;
    use ditto_core::{CancelToken, Outcome, Player};

    let store = MacroStore::new(&dir)?;
    let events = store.load(name)?;
    println!("Playing {name} ({} events) at {speed}x speed...", events.len());
    println!("Starting in 2 seconds...");
    std::thread::sleep(std::time::Duration::from_secs(2));

    let outcome = Player::new()
        .speed(speed)
        .play(&events, &SendInputInjector, &CancelToken::new());
    match outcome {
        Outcome::Completed => println!("Done."),
        Outcome::Cancelled => println!("Cancelled."),
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn play(_name: &str, _dir: PathBuf, _speed: f64) -> Result<()> {
    anyhow::bail!("playback needs SendInput; it runs on Windows only")
}

// ── Store management (cross-platform) ───────────────────────────────────────

fn list(dir: PathBuf) -> Result<()> {
    let store = MacroStore::new(&dir)?;
    let names = store.list()?;
    if names.is_empty() {
        println!("No macros saved.");
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

fn show(name: &str, dir: PathBuf, all: bool) -> Result<()> {
    let store = MacroStore::new(&dir)?;
    let events = store.load(name)?;

    let (mut moves, mut buttons, mut keys) = (0, 0, 0);
    for event in &events {
        match event.data {
            EventData::Move { .. } => moves += 1,
            EventData::Button { .. } => buttons += 1,
            EventData::Key { .. } => keys += 1,
        }
    }
    let duration = events.last().map(|e| e.t).unwrap_or(0.0);
    println!("Name: {name}");
    println!("Events: {} ({moves} moves, {buttons} buttons, {keys} keys)", events.len());
    println!("Duration: {duration:.3}s");
    if all {
        for (i, event) in events.iter().enumerate() {
            println!("{i}: {event:?}");
        }
    }
    Ok(())
}

fn delete(name: &str, dir: PathBuf) -> Result<()> {
    let store = MacroStore::new(&dir)?;
    store.delete(name)?;
    println!("Deleted: {name}");
    Ok(())
}

fn trim(name: &str, percent: f64, output: Option<String>, dir: PathBuf) -> Result<()> {
    let store = MacroStore::new(&dir)?;
    let events = store.load(name)?;
    let keep = trim_len(events.len(), percent);
    let output = output.unwrap_or_else(|| trimmed_name(name));
    store.save_as(&output, &events[..keep])?;
    println!(
        "Trimmed {name} -> {output} ({keep} events kept, {} removed)",
        events.len() - keep
    );
    Ok(())
}

/// Number of leading events kept when the trailing `percent` is dropped.
fn trim_len(len: usize, percent: f64) -> usize {
    (len as f64 * (1.0 - percent.clamp(0.0, 1.0))) as usize
}

fn trimmed_name(name: &str) -> String {
    let suffix = format!(".{MACRO_EXT}");
    match name.strip_suffix(&suffix) {
        Some(stem) => format!("{stem}_trimmed{suffix}"),
        None => format!("{name}_trimmed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_drops_trailing_fraction() {
        assert_eq!(trim_len(100, 0.1), 90);
        assert_eq!(trim_len(0, 0.1), 0);
        assert_eq!(trim_len(10, 1.0), 0);
        assert_eq!(trim_len(10, 0.0), 10);
        // out-of-range fractions clamp instead of panicking
        assert_eq!(trim_len(10, 2.0), 0);
    }

    #[test]
    fn trimmed_names_keep_the_extension() {
        assert_eq!(trimmed_name("macro_001.jsonl"), "macro_001_trimmed.jsonl");
        assert_eq!(trimmed_name("odd"), "odd_trimmed");
    }
}
