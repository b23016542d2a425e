//! File-backed journal and snapshot store.
//!
//! # Log format
//!
//! One append-only file per persistence key at `<root>/journal/<key>.log`:
//!
//! ```text
//! [u64 LE base]                  header: seq of the first frame minus one
//! [u32 LE len][len bytes]        frame 1  (seq = base + 1)
//! [u32 LE len][len bytes]        frame 2  (seq = base + 2)
//! …
//! ```
//!
//! The header makes sequence numbers survive truncation: `truncate(up_to)`
//! rewrites the log with `base = up_to` and only the surviving frames, via a
//! temp file and an atomic rename.
//!
//! A torn tail frame (crash mid-append) is detected when the log is opened:
//! the file is cut back to the last complete frame, which is what keeps a
//! failed append invisible to later replays.
//!
//! # Snapshot format
//!
//! One file per snapshot at `<root>/snapshots/<key>.<seq>.snap`:
//! `[u32 LE meta_len][meta JSON][state bytes]`, written to a temp file and
//! renamed into place so a crash never leaves a half-written snapshot where
//! `latest` could find it.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::warn;
use uta_core::SeqNr;

use crate::journal::EventJournal;
use crate::snapshot::{SnapshotMeta, SnapshotStore};
use crate::{JournalError, JournalResult};

const LOG_HEADER_LEN: u64 = 8;

// ── FileJournal ───────────────────────────────────────────────────────────────

/// Per-key open log state.  `count` is the number of frames currently in the
/// file, so `last_seq = base + count` without re-scanning.
struct LogState {
    path:   PathBuf,
    writer: BufWriter<File>,
    base:   u64,
    count:  u64,
}

/// Durable [`EventJournal`] storing one length-prefixed log file per key.
pub struct FileJournal {
    dir:  PathBuf,
    sync: bool,
    logs: Mutex<HashMap<String, Arc<Mutex<LogState>>>>,
}

impl FileJournal {
    /// Open (or create) a journal rooted at `<root>/journal/`.
    ///
    /// `sync` controls whether every append is fsynced before it is reported
    /// durable; without it the write is flushed to the OS but not to disk.
    pub fn open(root: impl AsRef<Path>, sync: bool) -> JournalResult<Self> {
        let dir = root.as_ref().join("journal");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            sync,
            logs: Mutex::new(HashMap::new()),
        })
    }

    fn log_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.log"))
    }

    /// Fetch the open state for `key`, opening and validating the file on
    /// first use.
    fn state_for(&self, key: &str) -> JournalResult<Arc<Mutex<LogState>>> {
        let mut logs = self.logs.lock().expect("journal lock poisoned");
        if let Some(state) = logs.get(key) {
            return Ok(Arc::clone(state));
        }

        let path = self.log_path(key);
        let (base, count) = open_and_repair(&path, key)?;
        let file = OpenOptions::new().append(true).open(&path)?;
        let state = Arc::new(Mutex::new(LogState {
            path,
            writer: BufWriter::new(file),
            base,
            count,
        }));
        logs.insert(key.to_owned(), Arc::clone(&state));
        Ok(state)
    }
}

/// Open `path` (creating it with a zero header if absent), verify the frame
/// stream, and cut off any torn tail.  Returns `(base, frame_count)`.
fn open_and_repair(path: &Path, key: &str) -> JournalResult<(u64, u64)> {
    if !path.exists() {
        let mut file = File::create(path)?;
        file.write_all(&0u64.to_le_bytes())?;
        file.sync_data()?;
        return Ok((0, 0));
    }

    let mut file = File::open(path)?;
    let mut header = [0u8; 8];
    if file.read_exact(&mut header).is_err() {
        return Err(JournalError::Corrupt {
            key:    key.to_owned(),
            detail: "log shorter than its header".to_owned(),
        });
    }
    let base = u64::from_le_bytes(header);

    let total = file.metadata()?.len();
    let mut offset = LOG_HEADER_LEN;
    let mut count = 0u64;
    let mut len_buf = [0u8; 4];
    loop {
        if offset == total {
            break;
        }
        if offset + 4 > total {
            break; // torn length prefix
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut len_buf)?;
        let frame_len = u32::from_le_bytes(len_buf) as u64;
        if offset + 4 + frame_len > total {
            break; // torn payload
        }
        offset += 4 + frame_len;
        count += 1;
    }

    if offset < total {
        warn!(key, dropped = total - offset, "discarding torn journal tail");
        drop(file);
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(offset)?;
        file.sync_data()?;
    }

    Ok((base, count))
}

impl EventJournal for FileJournal {
    fn append(&self, key: &str, payload: &[u8]) -> JournalResult<SeqNr> {
        let state = self.state_for(key)?;
        let mut log = state.lock().expect("log lock poisoned");

        let len = u32::try_from(payload.len()).map_err(|_| JournalError::Corrupt {
            key:    key.to_owned(),
            detail: format!("event of {} bytes exceeds the frame limit", payload.len()),
        })?;
        log.writer.write_all(&len.to_le_bytes())?;
        log.writer.write_all(payload)?;
        log.writer.flush()?;
        if self.sync {
            log.writer.get_ref().sync_data()?;
        }

        log.count += 1;
        Ok(SeqNr(log.base + log.count))
    }

    fn replay(&self, key: &str, after: SeqNr) -> JournalResult<Vec<(SeqNr, Vec<u8>)>> {
        let path = self.log_path(key);
        if !path.exists() {
            return Ok(vec![]);
        }
        // Make sure any buffered frames are on disk before reading back.
        let state = self.state_for(key)?;
        let _log = state.lock().expect("log lock poisoned");

        let mut file = File::open(&path)?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let base = u64::from_le_bytes(header);

        let mut events = Vec::new();
        let mut len_buf = [0u8; 4];
        let mut seq = base;
        loop {
            match file.read_exact(&mut len_buf) {
                Ok(())                                                   => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e)                                                  => return Err(e.into()),
            }
            let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            file.read_exact(&mut payload)?;
            seq += 1;
            if SeqNr(seq) > after {
                events.push((SeqNr(seq), payload));
            }
        }
        Ok(events)
    }

    fn truncate(&self, key: &str, up_to: SeqNr) -> JournalResult<()> {
        let state = self.state_for(key)?;
        let mut log = state.lock().expect("log lock poisoned");
        if up_to.0 <= log.base {
            return Ok(()); // already truncated at least this far
        }
        if up_to.0 > log.base + log.count {
            return Err(JournalError::Corrupt {
                key:    key.to_owned(),
                detail: format!("truncate to {up_to} beyond last seq {}", log.base + log.count),
            });
        }
        log.writer.flush()?;

        // Survivors are the frames with seq > up_to.
        drop(log);
        let survivors: Vec<(SeqNr, Vec<u8>)> = self.replay(key, up_to)?;
        let mut log = state.lock().expect("log lock poisoned");

        let tmp = log.path.with_extension("log.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            out.write_all(&up_to.0.to_le_bytes())?;
            for (_, payload) in &survivors {
                out.write_all(&(payload.len() as u32).to_le_bytes())?;
                out.write_all(payload)?;
            }
            out.flush()?;
            out.get_ref().sync_data()?;
        }
        fs::rename(&tmp, &log.path)?;

        let file = OpenOptions::new().append(true).open(&log.path)?;
        log.writer = BufWriter::new(file);
        log.base = up_to.0;
        log.count = survivors.len() as u64;
        Ok(())
    }

    fn last_seq(&self, key: &str) -> JournalResult<SeqNr> {
        if !self.log_path(key).exists() {
            return Ok(SeqNr::ZERO);
        }
        let state = self.state_for(key)?;
        let log = state.lock().expect("log lock poisoned");
        Ok(SeqNr(log.base + log.count))
    }
}

// ── FileSnapshots ─────────────────────────────────────────────────────────────

/// Durable [`SnapshotStore`] writing one file per snapshot generation.
pub struct FileSnapshots {
    dir: PathBuf,
}

impl FileSnapshots {
    /// Open (or create) a snapshot store rooted at `<root>/snapshots/`.
    pub fn open(root: impl AsRef<Path>) -> JournalResult<Self> {
        let dir = root.as_ref().join("snapshots");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn snap_path(&self, key: &str, seq: SeqNr) -> PathBuf {
        self.dir.join(format!("{key}.{}.snap", seq.0))
    }

    /// Sequence numbers of all retained snapshots for `key`, ascending.
    fn generations(&self, key: &str) -> JournalResult<Vec<SeqNr>> {
        let prefix = format!("{key}.");
        let mut seqs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix) else { continue };
            let Some(seq_str) = rest.strip_suffix(".snap") else { continue };
            if let Ok(seq) = seq_str.parse::<u64>() {
                seqs.push(SeqNr(seq));
            }
        }
        seqs.sort();
        Ok(seqs)
    }
}

impl SnapshotStore for FileSnapshots {
    fn save(&self, key: &str, meta: SnapshotMeta, state: &[u8]) -> JournalResult<()> {
        let meta_json = serde_json::to_vec(&meta).map_err(|e| JournalError::Corrupt {
            key:    key.to_owned(),
            detail: format!("unencodable snapshot metadata: {e}"),
        })?;

        let path = self.snap_path(key, meta.seq_nr);
        let tmp = path.with_extension("snap.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            out.write_all(&(meta_json.len() as u32).to_le_bytes())?;
            out.write_all(&meta_json)?;
            out.write_all(state)?;
            out.flush()?;
            out.get_ref().sync_data()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn latest(&self, key: &str) -> JournalResult<Option<(SnapshotMeta, Vec<u8>)>> {
        let Some(&seq) = self.generations(key)?.last() else {
            return Ok(None);
        };
        let mut file = File::open(self.snap_path(key, seq))?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let mut meta_json = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        file.read_exact(&mut meta_json)?;
        let meta: SnapshotMeta =
            serde_json::from_slice(&meta_json).map_err(|e| JournalError::Corrupt {
                key:    key.to_owned(),
                detail: format!("undecodable snapshot metadata: {e}"),
            })?;
        let mut state = Vec::new();
        file.read_to_end(&mut state)?;
        Ok(Some((meta, state)))
    }

    fn delete(&self, key: &str, older_than: SeqNr) -> JournalResult<()> {
        for seq in self.generations(key)? {
            if seq < older_than {
                match fs::remove_file(self.snap_path(key, seq)) {
                    Ok(())                                              => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e)                                             => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
