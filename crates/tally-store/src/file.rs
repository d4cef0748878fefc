use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tally_types::{ContentHash, Receipt};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{RawLine, ReceiptLog};

/// Flush/sync strategy for the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Flush to the OS and rely on its page cache.
    #[default]
    OsDefault,
}

/// Durable, append-only JSONL receipt log.
///
/// On-disk format: one receipt per line, serialized as a JSON object with
/// sorted keys, terminated by `\n`. A trailing segment without a newline is
/// an append still in flight (or torn by a crash) and is not returned.
/// Such a fragment is closed off with a `\n` before the next append, so it
/// reads back as one corrupt line instead of absorbing the next receipt.
pub struct FileLog {
    /// Path to the log file.
    path: PathBuf,
    /// Append handle; holding the lock is what serializes writers.
    writer: Mutex<Writer>,
    sync_mode: SyncMode,
}

struct Writer {
    file: File,
    /// A write failed partway and the fragment is not yet terminated.
    torn: bool,
}

impl FileLog {
    /// Open (or create) the log file at the given path.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        if terminate_torn_tail(&mut file)? {
            warn!(path = %path.display(), "terminated torn tail line");
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Writer { file, torn: false }),
            sync_mode,
        })
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }
}

impl ReceiptLog for FileLog {
    fn append(&self, receipt: &Receipt) -> StoreResult<ContentHash> {
        let mut line =
            serde_json::to_string(receipt).map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
            if writer.torn {
                terminate_torn_tail(&mut writer.file)?;
                writer.torn = false;
            }
            if let Err(e) = write_line(&mut writer.file, line.as_bytes()) {
                writer.torn = true;
                match terminate_torn_tail(&mut writer.file) {
                    Ok(_) => writer.torn = false,
                    Err(repair) => {
                        warn!(error = %repair, "could not terminate partial line");
                    }
                }
                return Err(e.into());
            }
            if self.sync_mode == SyncMode::EveryWrite {
                writer.file.sync_data()?;
            }
        }

        debug!(
            receipt_type = %receipt.receipt_type(),
            tenant_id = %receipt.tenant_id,
            len = line.len(),
            "receipt appended"
        );
        Ok(receipt.payload_hash.clone())
    }

    fn read_raw(&self) -> StoreResult<Vec<RawLine>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        let mut number = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            number += 1;
            if buf.last() != Some(&b'\n') {
                debug!(line = number, "ignoring unterminated tail line");
                break;
            }
            let text = match std::str::from_utf8(&buf) {
                Ok(text) => text.trim(),
                Err(e) => {
                    lines.push(RawLine::Corrupt {
                        number,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }
            lines.push(match serde_json::from_str(text) {
                Ok(value) => RawLine::Parsed { number, value },
                Err(e) => RawLine::Corrupt {
                    number,
                    reason: e.to_string(),
                },
            });
        }

        debug!(lines = lines.len(), path = %self.path.display(), "receipt log scanned");
        Ok(lines)
    }
}

fn write_line(file: &mut File, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.flush()
}

/// Append a `\n` if the file is non-empty and does not end in one.
///
/// Returns whether a fragment was terminated.
fn terminate_torn_tail(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(false);
    }
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(true)
}
