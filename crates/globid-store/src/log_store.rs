use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{CounterStore, Result, StoreError};

const LOG_FILE: &str = "counters.log";
const SNAPSHOT_FILE: &str = "counters.snapshot";
const SNAPSHOT_TMP_FILE: &str = "counters.snapshot.tmp";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Create the store directory when it does not exist yet.
    pub create: bool,
    /// fsync the log after every insert.
    pub sync_writes: bool,
    /// Fold the log into a snapshot once it grows past this many bytes.
    pub compact_after_bytes: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create: true,
            sync_writes: true,
            compact_after_bytes: 1024 * 1024,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

struct LogWriter {
    file: File,
    len: u64,
}

/// File-backed store: an append-only record log replayed over the last
/// snapshot on open, with an in-memory map serving reads.
pub struct LogStore {
    dir: PathBuf,
    options: StoreOptions,
    writer: Mutex<Option<LogWriter>>,
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl LogStore {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        if options.create {
            fs::create_dir_all(&dir)?;
        } else if !dir.is_dir() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("counter store {} does not exist", dir.display()),
            )));
        }

        let mut data = load_snapshot(&dir.join(SNAPSHOT_FILE))?;

        let log_path = dir.join(LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&log_path)?;
        let bytes = fs::read(&log_path)?;
        let (records, valid_len) = decode_records(&bytes);
        if valid_len < bytes.len() {
            log::warn!(
                "discarding {} torn bytes at the tail of {}",
                bytes.len() - valid_len,
                log_path.display()
            );
            file.set_len(valid_len as u64)?;
            file.sync_data()?;
        }
        for (key, value) in records {
            data.insert(key, value);
        }
        file.seek(SeekFrom::Start(valid_len as u64))?;

        log::info!(
            "counter store {} opened with {} keys",
            dir.display(),
            data.len()
        );

        Ok(Self {
            dir,
            options,
            writer: Mutex::new(Some(LogWriter {
                file,
                len: valid_len as u64,
            })),
            data: RwLock::new(data),
        })
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held in the record log (zero right after compaction).
    pub fn log_len(&self) -> Result<u64> {
        let writer = self.writer.lock();
        writer.as_ref().map(|w| w.len).ok_or(StoreError::Closed)
    }

    /// Writes the current map to the snapshot file and truncates the log.
    pub fn compact(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(StoreError::Closed)?;
        self.compact_locked(writer)
    }

    fn compact_locked(&self, writer: &mut LogWriter) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: self.data.read().clone(),
        };
        let encoded = bincode::serialize(&snapshot)?;
        let tmp_path = self.dir.join(SNAPSHOT_TMP_FILE);
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&encoded)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, self.dir.join(SNAPSHOT_FILE))?;
        // The log may only shrink once the snapshot's directory entry is on disk.
        sync_dir(&self.dir)?;

        writer.file.set_len(0)?;
        writer.file.seek(SeekFrom::Start(0))?;
        writer.file.sync_data()?;
        log::debug!(
            "compacted counter log of {} bytes into snapshot with {} keys",
            writer.len,
            snapshot.entries.len()
        );
        writer.len = 0;
        Ok(())
    }
}

impl CounterStore for LogStore {
    fn fetch(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.writer.lock().is_none() {
            return Err(StoreError::Closed);
        }
        Ok(self.data.read().get(key).cloned())
    }

    fn insert(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(StoreError::Closed)?;

        let mut record = Vec::with_capacity(8 + key.len() + value.len());
        encode_record(&mut record, &key, &value);
        if let Err(err) = append(writer, &record, self.options.sync_writes) {
            // Drop whatever part of the record reached the file so the next
            // append does not land behind a torn record. If that fails too,
            // later appends would be lost on replay, so the store shuts.
            if let Err(rollback_err) = rollback(writer) {
                log::error!(
                    "failed to roll back torn counter record in {}: {rollback_err}; closing store",
                    self.dir.display()
                );
                guard.take();
            }
            return Err(err.into());
        }
        writer.len += record.len() as u64;
        self.data.write().insert(key, value);

        // The record is durable at this point; a failed compaction leaves the
        // log in place and is retried on the next insert.
        if writer.len >= self.options.compact_after_bytes {
            if let Err(err) = self.compact_locked(writer) {
                log::warn!("counter log compaction failed: {err}");
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        if let Some(writer) = guard.take() {
            writer.file.sync_all()?;
            log::info!("counter store {} closed", self.dir.display());
        }
        Ok(())
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("failed to close counter store {}: {err}", self.dir.display());
        }
    }
}

fn append(writer: &mut LogWriter, record: &[u8], sync: bool) -> io::Result<()> {
    writer.file.write_all(record)?;
    if sync {
        writer.file.sync_data()?;
    }
    Ok(())
}

fn rollback(writer: &mut LogWriter) -> io::Result<()> {
    writer.file.set_len(writer.len)?;
    writer.file.seek(SeekFrom::Start(writer.len))?;
    Ok(())
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

fn load_snapshot(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => {
            let snapshot: Snapshot = bincode::deserialize(&bytes)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported snapshot version {}", snapshot.version),
                )));
            }
            Ok(snapshot.entries)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

fn encode_record(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value);
}

/// Decodes complete records and returns them with the length of the valid
/// prefix. Anything past that prefix is a torn write.
fn decode_records(bytes: &[u8]) -> (Vec<(Vec<u8>, Vec<u8>)>, usize) {
    let mut records = Vec::new();
    let mut offset = 0usize;
    loop {
        let Some((key, after_key)) = read_chunk(bytes, offset) else {
            break;
        };
        let Some((value, after_value)) = read_chunk(bytes, after_key) else {
            break;
        };
        records.push((key.to_vec(), value.to_vec()));
        offset = after_value;
    }
    (records, offset)
}

fn read_chunk(bytes: &[u8], offset: usize) -> Option<(&[u8], usize)> {
    let len_end = offset.checked_add(4)?;
    let len_bytes: [u8; 4] = bytes.get(offset..len_end)?.try_into().ok()?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    let end = len_end.checked_add(len)?;
    let chunk = bytes.get(len_end..end)?;
    Some((chunk, end))
}
