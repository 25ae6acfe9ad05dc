use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, info, warn};
use zstore_types::{ContentKey, KEY_LEN};

use crate::error::{LogError, LogResult};
use crate::traits::Log;

/// Flush/sync strategy for the file log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Flush to the OS after every append and rely on page-cache
    /// write-back; `flush()` forces an `fsync`.
    #[default]
    OsDefault,
}

/// Configuration for a [`FileLog`].
#[derive(Clone, Debug, Default)]
pub struct FileLogConfig {
    /// Sync/flush strategy.
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Location of a record's value inside the file.
#[derive(Clone, Copy, Debug)]
struct RecordLoc {
    /// Offset of the first value byte (after header and key).
    offset: u64,
    /// Value length in bytes.
    len: usize,
}

fn parse_header(buf: &[u8; HEADER_SIZE]) -> (u32, u32) {
    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let crc = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    (length, crc)
}

/// What the scan found at one offset.
enum Frame {
    /// CRC-checked record ending at `end`.
    Intact { key: ContentKey, end: u64 },
    /// Well-framed record whose body fails its CRC.
    BadCrc { end: u64, expected: u32, actual: u32 },
    /// Bytes that do not frame a record: short header, impossible length,
    /// or a length running past the end of the file.
    Unframed,
}

/// Read the record starting at `offset`.
fn read_frame<R: Read + Seek>(reader: &mut R, offset: u64, file_len: u64) -> LogResult<Frame> {
    if offset + HEADER_SIZE as u64 > file_len {
        return Ok(Frame::Unframed);
    }
    reader.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let (length, expected) = parse_header(&header);
    let end = offset + HEADER_SIZE as u64 + u64::from(length);
    if (length as usize) < KEY_LEN || end > file_len {
        return Ok(Frame::Unframed);
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body)?;
    let actual = crc32fast::hash(&body);
    if actual != expected {
        return Ok(Frame::BadCrc {
            end,
            expected,
            actual,
        });
    }
    let key = ContentKey::from_slice(&body[..KEY_LEN]).map_err(|e| LogError::Corrupt {
        offset,
        reason: e.to_string(),
    })?;
    Ok(Frame::Intact { key, end })
}

/// First offset in `from..until` where an intact record starts.
fn find_intact<R: Read + Seek>(
    reader: &mut R,
    from: u64,
    until: u64,
    file_len: u64,
) -> LogResult<Option<u64>> {
    let mut pos = from;
    while pos < until && pos + (HEADER_SIZE + KEY_LEN) as u64 <= file_len {
        if let Frame::Intact { .. } = read_frame(reader, pos, file_len)? {
            return Ok(Some(pos));
        }
        pos += 1;
    }
    Ok(None)
}

/// Index rebuilt by [`FileLog::scan`].
struct ScanResult {
    index: HashMap<ContentKey, RecordLoc>,
    records: u64,
    /// Length of the file once a torn tail is cut off.
    valid_len: u64,
}

/// Internal mutable state for the writer.
struct LogWriter {
    writer: BufWriter<File>,
    /// Current write offset (end of the last complete record).
    offset: u64,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
}

impl LogWriter {
    /// Write one framed record. On failure the file is cut back to the
    /// previous record boundary.
    fn write_record(&mut self, record: &[u8], sync: bool) -> LogResult<u64> {
        if self.poisoned {
            return Err(LogError::WriterPoisoned {
                offset: self.offset,
            });
        }
        let start = self.offset;
        let written = self
            .writer
            .write_all(record)
            .and_then(|()| self.writer.flush())
            .and_then(|()| {
                if sync {
                    self.writer.get_ref().sync_all()
                } else {
                    Ok(())
                }
            });

        if let Err(e) = written {
            if let Err(rollback) = self.rollback(start) {
                warn!(offset = start, error = %rollback, "rollback failed; log writer poisoned");
                self.poisoned = true;
            }
            return Err(e.into());
        }
        self.offset += record.len() as u64;
        Ok(start)
    }

    /// Drop any buffered bytes and truncate the file to `offset`.
    fn rollback(&mut self, offset: u64) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // `into_parts` hands back the buffer instead of flushing it.
        let (file, _discarded) = stale.into_parts();
        file.set_len(offset)?;
        file.sync_all()
    }
}

/// Single-file, append-only key-value log.
///
/// On-disk record format:
/// ```text
/// [4 bytes: body length (little-endian u32)]
/// [4 bytes: CRC32 of body (little-endian u32)]
/// [32 bytes: content key]
/// [N bytes: value]
/// ```
///
/// The body is the key followed by the value. Opening a log scans it front
/// to back and rebuilds the key index; later records for a key replace
/// earlier ones. Records that fail the CRC check are skipped. Bytes that
/// do not frame a record are skipped up to the next intact record; only
/// when no intact record follows them are they treated as a torn tail and
/// cut off, so new appends start on a record boundary.
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    reader: Mutex<File>,
    index: RwLock<HashMap<ContentKey, RecordLoc>>,
    records: Mutex<u64>,
    config: FileLogConfig,
}

impl FileLog {
    /// Open (or create) a log file at the given path.
    pub fn open(path: &Path, config: FileLogConfig) -> LogResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let ScanResult {
            index,
            records,
            valid_len,
        } = Self::scan(path)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn tail of log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let reader = File::open(path)?;
        info!(path = %path.display(), records, keys = index.len(), "log opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset: valid_len,
                poisoned: false,
            }),
            reader: Mutex::new(reader),
            index: RwLock::new(index),
            records: Mutex::new(records),
            config,
        })
    }

    /// Rebuild the index by reading the file front to back.
    fn scan(path: &Path) -> LogResult<ScanResult> {
        let mut file = BufReader::new(File::open(path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut index = HashMap::new();
        let mut records = 0u64;
        let mut offset: u64 = 0;

        while offset < file_len {
            match read_frame(&mut file, offset, file_len)? {
                Frame::Intact { key, end } => {
                    index.insert(
                        key,
                        RecordLoc {
                            offset: offset + (HEADER_SIZE + KEY_LEN) as u64,
                            len: (end - offset) as usize - HEADER_SIZE - KEY_LEN,
                        },
                    );
                    records += 1;
                    offset = end;
                }
                Frame::BadCrc {
                    end,
                    expected,
                    actual,
                } => {
                    warn!(offset, expected, actual, "CRC mismatch; skipping record");
                    // A damaged length can span intact records; resume at
                    // the first one inside the skipped range.
                    offset = find_intact(&mut file, offset + 1, end, file_len)?.unwrap_or(end);
                }
                Frame::Unframed => match find_intact(&mut file, offset + 1, file_len, file_len)? {
                    Some(next) => {
                        warn!(offset, next, "unframed bytes; resuming at next intact record");
                        offset = next;
                    }
                    None => {
                        debug!(offset, file_len, "torn tail; stopping scan");
                        break;
                    }
                },
            }
        }

        let valid_len = offset.min(file_len);
        debug!(records, keys = index.len(), valid_len, "log scan complete");
        Ok(ScanResult {
            index,
            records,
            valid_len,
        })
    }

    /// Number of distinct keys.
    fn len(&self) -> usize {
        self.index.read().expect("lock poisoned").len()
    }

    /// Number of intact records, including superseded ones.
    fn record_count(&self) -> u64 {
        *self.records.lock().expect("lock poisoned")
    }

    /// Current write offset (file length).
    fn offset(&self) -> u64 {
        self.writer.lock().expect("lock poisoned").offset
    }

    fn read_at(&self, loc: RecordLoc) -> LogResult<Vec<u8>> {
        let mut reader = self.reader.lock().expect("lock poisoned");
        reader.seek(SeekFrom::Start(loc.offset))?;
        let mut value = vec![0u8; loc.len];
        reader.read_exact(&mut value).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => LogError::Corrupt {
                offset: loc.offset,
                reason: "record extends beyond end of file".into(),
            },
            _ => LogError::Io(e),
        })?;
        Ok(value)
    }
}

impl Log for FileLog {
    fn append(&self, key: &ContentKey, value: &[u8]) -> LogResult<()> {
        let body_len = KEY_LEN + value.len();
        let length = u32::try_from(body_len)
            .map_err(|_| LogError::RecordTooLarge { len: value.len() })?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(key.as_bytes());
        hasher.update(value);
        let crc = hasher.finalize();

        let mut record = Vec::with_capacity(HEADER_SIZE + body_len);
        record.extend_from_slice(&length.to_le_bytes());
        record.extend_from_slice(&crc.to_le_bytes());
        record.extend_from_slice(key.as_bytes());
        record.extend_from_slice(value);

        let mut w = self.writer.lock().expect("lock poisoned");
        let record_offset =
            w.write_record(&record, self.config.sync_mode == SyncMode::EveryWrite)?;

        // Publish only after the bytes reached the file, while still holding
        // the writer lock so index order matches file order.
        self.index.write().expect("lock poisoned").insert(
            *key,
            RecordLoc {
                offset: record_offset + (HEADER_SIZE + KEY_LEN) as u64,
                len: value.len(),
            },
        );
        *self.records.lock().expect("lock poisoned") += 1;
        drop(w);

        debug!(key = %key.short_hex(), offset = record_offset, len = value.len(), "log append");
        Ok(())
    }

    fn lookup(&self, key: &ContentKey) -> LogResult<Option<Vec<u8>>> {
        let loc = self.index.read().expect("lock poisoned").get(key).copied();
        match loc {
            Some(loc) => self.read_at(loc).map(Some),
            None => Ok(None),
        }
    }

    fn contains(&self, key: &ContentKey) -> LogResult<bool> {
        Ok(self.index.read().expect("lock poisoned").contains_key(key))
    }

    fn flush(&self) -> LogResult<()> {
        let mut w = self.writer.lock().expect("lock poisoned");
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLog")
            .field("path", &self.path)
            .field("keys", &self.len())
            .field("records", &self.record_count())
            .field("offset", &self.offset())
            .finish()
    }
}
