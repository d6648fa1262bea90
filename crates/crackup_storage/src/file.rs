//! Log-structured file store for persistent storage.
//!
//! Each store location is a directory:
//!
//! ```text
//! <location>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ data.log          # Append-only log of batch frames
//! ```
//!
//! Opening replays `data.log` into an ordered index of value positions;
//! values themselves stay on disk and are read on demand.

use crate::cursor::{Seek, SeekCursor};
use crate::error::{StorageError, StorageResult};
use crate::factory::{Capabilities, Capability, StoreFactory};
use crate::log::{encode_frame, read_frame, FrameEntry, ReadOutcome};
use crate::store::{BatchOp, Direction, IterOptions, OrderedStore, Record, RecordIter};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek as _, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "data.log";
/// Scratch file for `repair`, renamed over `data.log` once complete.
const REPAIR_FILE: &str = "data.log.repair";

/// Location of a live value inside the log.
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    len: usize,
}

type Index = BTreeMap<Vec<u8>, Slot>;

/// Outcome of replaying a log.
struct Replay {
    index: Index,
    /// Length of the longest prefix made of valid frames.
    valid_len: u64,
    /// Why replay stopped early, if it did.
    damage: Option<String>,
}

#[derive(Debug)]
struct LogState {
    file: File,
    size: u64,
    index: Index,
    /// Bytes past `size` may hold a partial frame that could not be cut off.
    torn: bool,
}

/// A persistent ordered store backed by an append-only log.
///
/// # Durability
///
/// - Every `put`, `delete`, and `batch` appends one checksummed frame
/// - `flush()` calls `File::sync_data()` to ensure data is on disk
/// - A frame torn by a crash is detected on the next open; run
///   [`FileStoreFactory::repair`] to drop it
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. A single
/// mutex serializes log appends, index updates, and value reads. The
/// directory's `LOCK` file keeps other handles out.
///
/// # Example
///
/// ```no_run
/// use crackup_storage::{FileStore, OrderedStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("my_store")).unwrap();
/// store.put(b"key", b"persistent value").unwrap();
/// store.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<LogState>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates the store in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another handle holds the lock (returns `Locked`)
    /// - The log has a damaged tail (returns `Corrupted`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;
        let lock_file = acquire_lock(path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOG_FILE))?;

        let replay = replay(&file)?;
        if let Some(damage) = replay.damage {
            return Err(StorageError::corrupted(format!(
                "{damage} at offset {} of {}; repair required",
                replay.valid_len,
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LogState {
                file,
                size: replay.valid_len,
                index: replay.index,
                torn: false,
            }),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Returns `true` if no records are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().index.is_empty()
    }

    /// Returns the size of the log in bytes, including overwritten values.
    #[must_use]
    pub fn log_size(&self) -> u64 {
        self.state.lock().size
    }

    /// Rebuilds the log at `path` from its longest valid prefix.
    ///
    /// The rewritten log holds one frame per live record, which also drops
    /// overwritten values and deletions. Returns the number of records kept.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if the store is open elsewhere, or an I/O error.
    pub fn repair(path: &Path) -> StorageResult<usize> {
        let _lock_file = acquire_lock(path)?;
        let log_path = path.join(LOG_FILE);
        let mut source = File::open(&log_path)?;
        let replay = replay(&source)?;

        let scratch_path = path.join(REPAIR_FILE);
        let scratch = File::create(&scratch_path)?;
        let mut writer = BufWriter::new(scratch);
        for (key, slot) in &replay.index {
            let value = read_slot(&mut source, *slot)?;
            writer.write_all(&encode_frame(&[BatchOp::put(key.clone(), value)])?.bytes)?;
        }
        let scratch = writer.into_inner().map_err(|e| e.into_error())?;
        scratch.sync_all()?;
        drop(source);

        fs::rename(&scratch_path, &log_path)?;
        Ok(replay.index.len())
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn acquire_lock(path: &Path) -> StorageResult<File> {
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path.join(LOCK_FILE))?;

    // Non-blocking: a second handle fails fast
    if lock_file.try_lock_exclusive().is_err() {
        return Err(StorageError::Locked);
    }
    Ok(lock_file)
}

/// Replays every valid frame of `file` into an index.
fn replay(file: &File) -> StorageResult<Replay> {
    let total = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;

    let mut index = Index::new();
    let mut offset = 0u64;
    let damage = loop {
        match read_frame(&mut reader, total - offset)? {
            ReadOutcome::Frame(frame) => {
                apply(&mut index, offset, frame.entries);
                offset += frame.len as u64;
            }
            ReadOutcome::End => break None,
            ReadOutcome::Damaged(message) => break Some(message),
        }
    };

    Ok(Replay {
        index,
        valid_len: offset,
        damage,
    })
}

/// Applies one frame's entries, written at `frame_offset`, to `index`.
fn apply(index: &mut Index, frame_offset: u64, entries: Vec<FrameEntry>) {
    for entry in entries {
        match entry {
            FrameEntry::Put {
                key,
                value_at,
                value_len,
            } => {
                index.insert(
                    key,
                    Slot {
                        offset: frame_offset + value_at as u64,
                        len: value_len,
                    },
                );
            }
            FrameEntry::Delete { key } => {
                index.remove(&key);
            }
        }
    }
}

fn read_slot(file: &mut File, slot: Slot) -> StorageResult<Vec<u8>> {
    file.seek(SeekFrom::Start(slot.offset))?;
    let mut buffer = vec![0u8; slot.len];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// The file operations an append needs.
trait LogFile: Write + io::Seek {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Writes one frame at `offset`, the end of the valid log.
///
/// A failed write is cut back to `offset`. If that cut fails too, `torn` is
/// set and every later append retries it first, failing until it succeeds,
/// so a new frame never lands in front of leftover bytes.
fn append_frame<F: LogFile>(
    file: &mut F,
    offset: u64,
    bytes: &[u8],
    torn: &mut bool,
) -> io::Result<()> {
    if *torn {
        file.truncate(offset)?;
        *torn = false;
    }

    let written = file
        .seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(bytes));
    if let Err(e) = written {
        if file.truncate(offset).is_err() {
            *torn = true;
        }
        return Err(e);
    }
    Ok(())
}

impl Seek for FileStore {
    fn seek(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        direction: Direction,
    ) -> StorageResult<Option<Record>> {
        let mut state = self.state.lock();
        let found = {
            let mut range = state.index.range::<[u8], _>((lower, upper));
            let entry = match direction {
                Direction::Forward => range.next(),
                Direction::Reverse => range.next_back(),
            };
            entry.map(|(key, slot)| (key.clone(), *slot))
        };

        match found {
            Some((key, slot)) => {
                let value = read_slot(&mut state.file, slot)?;
                Ok(Some(Record { key, value }))
            }
            None => Ok(None),
        }
    }
}

impl OrderedStore for FileStore {
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>> {
        let mut state = self.state.lock();
        let slot = *state
            .index
            .get(key)
            .ok_or_else(|| StorageError::not_found(key))?;
        read_slot(&mut state.file, slot)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.batch(vec![BatchOp::put(key, value)])
    }

    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.batch(vec![BatchOp::delete(key)])
    }

    fn batch(&self, ops: Vec<BatchOp>) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let encoded = encode_frame(&ops)?;
        let mut state = self.state.lock();
        let offset = state.size;

        let LogState { file, torn, .. } = &mut *state;
        append_frame(file, offset, &encoded.bytes, torn)?;

        state.size += encoded.bytes.len() as u64;
        apply(&mut state.index, offset, encoded.frame.entries);
        Ok(())
    }

    fn iter(&self, options: IterOptions) -> StorageResult<RecordIter<'_>> {
        Ok(Box::new(SeekCursor::new(self, options)))
    }

    fn flush(&self) -> StorageResult<()> {
        let state = self.state.lock();
        state.file.sync_data()?;
        Ok(())
    }
}

/// Factory opening [`FileStore`] directories.
///
/// Declares both `destroy` and `repair`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStoreFactory;

impl FileStoreFactory {
    /// Creates the factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StoreFactory for FileStoreFactory {
    fn open(&self, location: &Path) -> StorageResult<Box<dyn OrderedStore>> {
        Ok(Box::new(FileStore::open(location)?))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::from([Capability::Destroy, Capability::Repair])
    }

    /// Deletes the store's own files, then the directory if nothing else
    /// is left in it. A directory without `data.log` is refused.
    fn destroy(&self, location: &Path) -> StorageResult<()> {
        if !location.exists() {
            return Ok(());
        }
        if !location.join(LOG_FILE).is_file() {
            return Err(StorageError::corrupted(format!(
                "{} is not a store directory: {LOG_FILE} is missing",
                location.display()
            )));
        }

        // Held until the data files are gone; fails while a handle is open
        let lock_file = acquire_lock(location)?;
        remove_if_exists(&location.join(LOG_FILE))?;
        remove_if_exists(&location.join(REPAIR_FILE))?;
        drop(lock_file);
        remove_if_exists(&location.join(LOCK_FILE))?;

        if fs::read_dir(location)?.next().is_none() {
            fs::remove_dir(location)?;
        }
        Ok(())
    }

    fn repair(&self, location: &Path) -> StorageResult<()> {
        FileStore::repair(location).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keys(store: &FileStore, options: IterOptions) -> Vec<Vec<u8>> {
        store
            .iter(options)
            .unwrap()
            .map(|record| record.unwrap().key)
            .collect()
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");

        let store = FileStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.log_size(), 0);
        assert!(path.join(LOG_FILE).exists());
        assert!(path.join(LOCK_FILE).exists());
    }

    #[test]
    fn file_put_get_delete() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put(b"hello", b"world").unwrap();
        assert_eq!(store.get(b"hello").unwrap(), b"world");

        store.put(b"hello", b"again").unwrap();
        assert_eq!(store.get(b"hello").unwrap(), b"again");

        store.delete(b"hello").unwrap();
        assert!(store.get(b"hello").unwrap_err().is_not_found());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store
                .batch(vec![
                    BatchOp::put(b"b".to_vec(), b"2".to_vec()),
                    BatchOp::put(b"a".to_vec(), b"1".to_vec()),
                    BatchOp::put(b"c".to_vec(), b"3".to_vec()),
                ])
                .unwrap();
            store.delete(b"c").unwrap();
            store.flush().unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(b"a").unwrap(), b"1");
        assert_eq!(store.get(b"b").unwrap(), b"2");
        assert_eq!(keys(&store, IterOptions::new()), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn file_iter_reverse_with_limit() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for key in [b"k1", b"k3", b"k2", b"k4"] {
            store.put(key, b"v").unwrap();
        }
        assert_eq!(
            keys(&store, IterOptions::new().reverse().limit(3)),
            vec![b"k4".to_vec(), b"k3".to_vec(), b"k2".to_vec()]
        );
    }

    #[test]
    fn file_lock_prevents_second_open() {
        let dir = tempdir().unwrap();
        let _store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            FileStore::open(dir.path()),
            Err(StorageError::Locked)
        ));
    }

    #[test]
    fn file_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(FileStore::open(dir.path()).unwrap());
        assert!(FileStore::open(dir.path()).is_ok());
    }

    #[test]
    fn file_torn_tail_requires_repair() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put(b"kept", b"value").unwrap();
            store.put(b"torn", b"value").unwrap();
        }

        let log_path = dir.path().join(LOG_FILE);
        let len = fs::metadata(&log_path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&log_path)
            .unwrap()
            .set_len(len - 2)
            .unwrap();

        assert!(matches!(
            FileStore::open(dir.path()),
            Err(StorageError::Corrupted(_))
        ));

        assert_eq!(FileStore::repair(dir.path()).unwrap(), 1);
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"kept").unwrap(), b"value");
        assert!(store.get(b"torn").unwrap_err().is_not_found());
    }

    #[test]
    fn file_repair_compacts_log() {
        let dir = tempdir().unwrap();
        let before = {
            let store = FileStore::open(dir.path()).unwrap();
            for i in 0..10u8 {
                store.put(b"same", &[i; 64]).unwrap();
            }
            store.log_size()
        };

        FileStore::repair(dir.path()).unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.log_size() < before);
        assert_eq!(store.get(b"same").unwrap(), vec![9u8; 64]);
    }

    #[test]
    fn factory_destroy_removes_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doomed");
        let factory = FileStoreFactory::new();

        let store = factory.open(&path).unwrap();
        store.put(b"k", b"v").unwrap();
        assert!(matches!(factory.destroy(&path), Err(StorageError::Locked)));

        drop(store);
        factory.destroy(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn factory_destroy_keeps_foreign_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared");
        let factory = FileStoreFactory::new();

        let store = factory.open(&path).unwrap();
        store.put(b"k", b"v").unwrap();
        drop(store);
        fs::write(path.join("notes.txt"), b"not ours").unwrap();

        factory.destroy(&path).unwrap();
        assert!(!path.join(LOG_FILE).exists());
        assert!(!path.join(LOCK_FILE).exists());
        assert_eq!(fs::read(path.join("notes.txt")).unwrap(), b"not ours");
    }

    #[test]
    fn factory_destroy_refuses_plain_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("documents");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("thesis.tex"), b"chapter one").unwrap();

        let result = FileStoreFactory::new().destroy(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
        assert_eq!(fs::read(path.join("thesis.tex")).unwrap(), b"chapter one");
        assert!(!path.join(LOCK_FILE).exists());
    }

    #[test]
    fn factory_destroy_missing_location_is_ok() {
        let dir = tempdir().unwrap();
        assert!(FileStoreFactory::new().destroy(&dir.path().join("never")).is_ok());
    }

    /// In-memory log whose writes and truncations can be made to fail.
    struct FlakyLog {
        inner: io::Cursor<Vec<u8>>,
        fail_writes: bool,
        fail_truncates: bool,
    }

    impl FlakyLog {
        fn new() -> Self {
            Self {
                inner: io::Cursor::new(Vec::new()),
                fail_writes: false,
                fail_truncates: false,
            }
        }

        fn bytes(&self) -> &[u8] {
            self.inner.get_ref()
        }
    }

    impl Write for FlakyLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                // A few bytes land before the device gives up
                self.inner.write_all(&buf[..buf.len().min(3)])?;
                return Err(io::Error::new(io::ErrorKind::Other, "device full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl io::Seek for FlakyLog {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl LogFile for FlakyLog {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncates {
                return Err(io::Error::new(io::ErrorKind::Other, "truncate refused"));
            }
            self.inner.get_mut().truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_write_is_cut_back() {
        let mut log = FlakyLog::new();
        let mut torn = false;
        append_frame(&mut log, 0, b"first-frame", &mut torn).unwrap();

        log.fail_writes = true;
        assert!(append_frame(&mut log, 11, b"second-frame", &mut torn).is_err());
        assert!(!torn);
        assert_eq!(log.bytes(), b"first-frame");
    }

    #[test]
    fn failed_cut_blocks_appends_until_retried() {
        let mut log = FlakyLog::new();
        let mut torn = false;
        append_frame(&mut log, 0, b"first-frame", &mut torn).unwrap();

        log.fail_writes = true;
        log.fail_truncates = true;
        assert!(append_frame(&mut log, 11, b"second-frame", &mut torn).is_err());
        assert!(torn);
        assert_eq!(log.bytes(), b"first-framesec");

        log.fail_writes = false;
        assert!(append_frame(&mut log, 11, b"x", &mut torn).is_err());
        assert_eq!(log.bytes(), b"first-framesec");

        log.fail_truncates = false;
        append_frame(&mut log, 11, b"x", &mut torn).unwrap();
        assert!(!torn);
        assert_eq!(log.bytes(), b"first-framex");
    }

    #[test]
    fn factory_declares_destroy_and_repair() {
        let caps = FileStoreFactory::new().capabilities();
        assert!(caps.contains(Capability::Destroy));
        assert!(caps.contains(Capability::Repair));
    }
}
