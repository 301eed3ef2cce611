// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log and snapshot compaction.
//!
//! Wire format: one JSON-encoded [`StoreEvent`](crate::StoreEvent) per line.
//! Snapshots are the full materialized state, JSON-encoded and zstd
//! compressed; on open the snapshot is loaded first, then the WAL tail is
//! replayed on top.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::state::{StoreEvent, StoreState};

const WAL_FILE: &str = "wal.jsonl";
const SNAPSHOT_FILE: &str = "state.json.zst";
const SNAPSHOT_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle on a state directory's WAL + snapshot pair.
pub struct Wal {
    dir: PathBuf,
    writer: BufWriter<File>,
}

impl Wal {
    /// Open (creating if needed) the WAL in `dir` and rebuild state:
    /// snapshot first, then every replayable WAL line. A corrupt tail line
    /// (torn write) ends replay with a warning rather than an error.
    pub fn open(dir: &Path) -> Result<(Self, StoreState), WalError> {
        std::fs::create_dir_all(dir)?;
        let mut state = StoreState::default();

        let snap_path = dir.join(SNAPSHOT_FILE);
        if snap_path.exists() {
            let mut raw = Vec::new();
            zstd::Decoder::new(File::open(&snap_path)?)?.read_to_end(&mut raw)?;
            state = serde_json::from_slice(&raw)?;
        }

        let wal_path = dir.join(WAL_FILE);
        if wal_path.exists() {
            let reader = BufReader::new(File::open(&wal_path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<StoreEvent>(&line) {
                    Ok(event) => state.apply(&event),
                    Err(err) => {
                        tracing::warn!(lineno, %err, "stopping WAL replay at corrupt line");
                        break;
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&wal_path)?;
        Ok((Self { dir: dir.to_path_buf(), writer: BufWriter::new(file) }, state))
    }

    /// Append one event and flush it to disk before the caller mutates state.
    pub fn append(&mut self, event: &StoreEvent) -> Result<(), WalError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write a snapshot of `state` and truncate the WAL.
    pub fn compact(&mut self, state: &StoreState) -> Result<(), WalError> {
        let snap_path = self.dir.join(SNAPSHOT_FILE);
        let tmp_path = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let mut encoder = zstd::Encoder::new(File::create(&tmp_path)?, SNAPSHOT_LEVEL)?;
        serde_json::to_writer(&mut encoder, state)?;
        encoder.finish()?.sync_all()?;
        std::fs::rename(&tmp_path, &snap_path)?;

        let wal_path = self.dir.join(WAL_FILE);
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&wal_path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
