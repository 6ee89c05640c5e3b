//! Macro storage - JSON lines format, one event per line.

use crate::error::{Error, Result};
use crate::events::Event;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extension given to stored macro files.
pub const MACRO_EXT: &str = "jsonl";

/// Name of the playlist file inside the macro directory.
pub const PLAYLIST_FILE: &str = "playlist.txt";

/// Directory-backed store for named macros and the playback playlist.
pub struct MacroStore {
    dir: PathBuf,
}

impl MacroStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(PLAYLIST_FILE)
    }

    /// Load a macro's event sequence by filename.
    pub fn load(&self, name: &str) -> Result<Vec<Event>> {
        let path = self.dir.join(name);
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(name.to_string()),
            _ => Error::Io(e),
        })?;
        let reader = BufReader::new(file);

        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|source| Error::Corrupt {
                name: name.to_string(),
                source,
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Save a recording under the lowest-numbered unused `macro_NNN` name.
    /// Never overwrites an existing file. Returns the chosen filename.
    pub fn save_new(&self, events: &[Event]) -> Result<String> {
        let mut index = 1u32;
        loop {
            let name = format!("macro_{index:03}.{MACRO_EXT}");
            let path = self.dir.join(&name);
            match File::options().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    write_events(file, events)?;
                    return Ok(name);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => index += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write a macro under an explicit name, replacing any existing file.
    pub fn save_as(&self, name: &str, events: &[Event]) -> Result<()> {
        let file = File::create(self.dir.join(name))?;
        write_events(file, events)
    }

    /// List stored macros, sorted by name.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(s) = entry.file_name().to_str() {
                if s.ends_with(MACRO_EXT) {
                    files.push(s.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        fs::remove_file(self.dir.join(name)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(name.to_string()),
            _ => Error::Io(e),
        })
    }

    /// Read the playlist: one macro filename per line, blank lines ignored.
    /// A missing or unreadable playlist is an empty playlist, not an error.
    pub fn list_playlist(&self) -> Vec<String> {
        let path = self.playlist_path();
        match fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            Err(e) => {
                warn!("playlist {} not readable: {}", path.display(), e);
                Vec::new()
            }
        }
    }
}

fn write_events(file: File, events: &[Event]) -> Result<()> {
    let mut w = BufWriter::new(file);
    for event in events {
        serde_json::to_writer(&mut w, event).map_err(io::Error::other)?;
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventData;

    fn sample() -> Vec<Event> {
        vec![
            Event::new(0.01, EventData::Move { dx: 5, dy: 0 }),
            Event::new(0.02, EventData::Move { dx: 0, dy: 3 }),
            Event::new(0.03, EventData::Button { mask: 0x1 }),
            Event::new(0.04, EventData::Key { code: 0x41, down: true }),
        ]
    }

    #[test]
    fn save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MacroStore::new(tmp.path()).unwrap();
        let name = store.save_new(&sample()).unwrap();
        assert_eq!(store.load(&name).unwrap(), sample());
    }

    #[test]
    fn sequential_saves_pick_fresh_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MacroStore::new(tmp.path()).unwrap();
        assert_eq!(store.save_new(&sample()).unwrap(), "macro_001.jsonl");
        assert_eq!(store.save_new(&sample()).unwrap(), "macro_002.jsonl");
        // a freed low index is reused, existing files untouched
        store.delete("macro_001.jsonl").unwrap();
        assert_eq!(store.save_new(&[]).unwrap(), "macro_001.jsonl");
        assert_eq!(store.load("macro_002.jsonl").unwrap(), sample());
    }

    #[test]
    fn load_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MacroStore::new(tmp.path()).unwrap();
        match store.load("macro_999.jsonl") {
            Err(Error::NotFound(name)) => assert_eq!(name, "macro_999.jsonl"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MacroStore::new(tmp.path()).unwrap();
        fs::write(tmp.path().join("macro_001.jsonl"), "not json\n").unwrap();
        assert!(matches!(
            store.load("macro_001.jsonl"),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn missing_playlist_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MacroStore::new(tmp.path()).unwrap();
        assert!(store.list_playlist().is_empty());
    }

    #[test]
    fn playlist_skips_blank_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MacroStore::new(tmp.path()).unwrap();
        fs::write(
            store.playlist_path(),
            "macro_001.jsonl\n\n  \nmacro_002.jsonl\n",
        )
        .unwrap();
        assert_eq!(
            store.list_playlist(),
            vec!["macro_001.jsonl", "macro_002.jsonl"]
        );
    }

    #[test]
    fn list_only_macros() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MacroStore::new(tmp.path()).unwrap();
        store.save_new(&sample()).unwrap();
        fs::write(store.playlist_path(), "macro_001.jsonl\n").unwrap();
        assert_eq!(store.list().unwrap(), vec!["macro_001.jsonl"]);
    }
}
