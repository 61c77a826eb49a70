//! JSON record store
//!
//! Three collections, one JSON document each:
//! `sessions.json` (object keyed by session id), `interactions.json` and
//! `issues.json` (arrays, append order preserved).
//!
//! Every call is a full load-mutate-save round trip with no cache between
//! calls. Writes go to a temp file in the same directory and are renamed over
//! the destination, so a crash mid-write never leaves half a JSON document.
//! A file that fails to parse (bad JSON or bad UTF-8) is moved aside as a
//! timestamped backup and read as an empty collection. A file that can't be
//! read at all is never written over.
//!
//! There is no cross-process locking: one process owns a storage directory.
//! Inside the process, mutations are serialized through [`RecordStore::writer`]
//! on a lock keyed by the canonical directory, so two stores opened on the
//! same directory still can't drop each other's write.

use crate::error::Result;
use crate::models::{Interaction, Issue, Session};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info, warn};

pub const SESSIONS_FILE: &str = "sessions.json";
pub const INTERACTIONS_FILE: &str = "interactions.json";
pub const ISSUES_FILE: &str = "issues.json";

/// Session collection, keyed by id
pub type SessionMap = BTreeMap<String, Session>;

/// The persisted collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Sessions,
    Interactions,
    Issues,
}

impl Collection {
    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Sessions => SESSIONS_FILE,
            Collection::Interactions => INTERACTIONS_FILE,
            Collection::Issues => ISSUES_FILE,
        }
    }
}

/// One write lock per storage directory, shared by every store opened on it
fn directory_lock(dir: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let key = lock_key(dir);
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

/// Absolute, symlink-resolved where possible. A directory that doesn't exist
/// yet resolves through its nearest existing ancestor.
fn lock_key(dir: &Path) -> PathBuf {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    };

    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(resolved) = existing.canonicalize() {
            return rest.iter().rev().fold(resolved, |path, part| path.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Per-process counter so concurrent temp files never share a name
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File-backed store for sessions, interactions and issues
#[derive(Debug)]
pub struct RecordStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl RecordStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    ///
    /// Stores opened on the same directory within one process share a write
    /// lock.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            write_lock: directory_lock(&dir),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    /// Take the write lock for a load-mutate-save sequence
    pub fn writer(&self) -> StoreWriter<'_> {
        // A panic in another writer leaves no partial file behind, so the
        // poisoned guard is still safe to reuse.
        let guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        StoreWriter {
            store: self,
            _guard: guard,
        }
    }

    // ========================================================================
    // Raw collection access
    // ========================================================================

    /// Read a collection for display. Missing → empty; unparsable → backed
    /// up, empty; unreadable → empty with a warning.
    pub fn load<T>(&self, collection: Collection) -> T
    where
        T: DeserializeOwned + Default,
    {
        match self.read_collection(collection) {
            Ok(data) => data,
            Err(e) => {
                warn!("Error reading {}: {}", self.path(collection).display(), e);
                T::default()
            }
        }
    }

    /// Read a collection ahead of a write. Fails instead of returning empty
    /// whenever the file on disk couldn't be read or moved aside, so a save
    /// can never replace data that was not loaded.
    fn read_collection<T>(&self, collection: Collection) -> io::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(collection);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }

        match serde_json::from_slice(&content) {
            Ok(data) => Ok(data),
            Err(e) => {
                warn!("Invalid JSON in {}: {}", path.display(), e);
                let backup = backup_corrupt_file(&path)?;
                warn!("Moved corrupt file to {}", backup.display());
                Ok(T::default())
            }
        }
    }

    /// Write a whole collection back atomically
    pub fn save<T: Serialize>(&self, collection: Collection, data: &T) -> Result<()> {
        self.writer().save(collection, data)
    }

    fn write_atomic<T: Serialize>(&self, collection: Collection, data: &T) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            info!("Created storage directory {}", self.dir.display());
        }

        let content = serde_json::to_string_pretty(data)?;
        let path = self.path(collection);
        let tmp_path = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            collection.file_name(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_then_rename(&tmp_path, &path, content.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        debug!("Saved {}", path.display());
        Ok(())
    }

    // ========================================================================
    // Typed reads (no lock; may observe a slightly stale snapshot)
    // ========================================================================

    pub fn sessions(&self) -> SessionMap {
        self.load(Collection::Sessions)
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.load(Collection::Interactions)
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.load(Collection::Issues)
    }

    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions().remove(session_id)
    }

    // ========================================================================
    // Single-step writes
    // ========================================================================

    pub fn put_session(&self, session: Session) -> Result<()> {
        self.writer().put_session(session)
    }

    pub fn append_interaction(&self, interaction: Interaction) -> Result<()> {
        self.writer().append_interaction(interaction)
    }

    pub fn append_issue(&self, issue: Issue) -> Result<()> {
        self.writer().append_issue(issue)
    }
}

/// Exclusive handle for multi-step mutations.
///
/// Reads through a writer fail on unreadable files rather than yielding an
/// empty collection that the following save would write over.
pub struct StoreWriter<'a> {
    store: &'a RecordStore,
    _guard: MutexGuard<'a, ()>,
}

impl StoreWriter<'_> {
    pub fn load<T>(&self, collection: Collection) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        Ok(self.store.read_collection(collection)?)
    }

    pub fn save<T: Serialize>(&self, collection: Collection, data: &T) -> Result<()> {
        self.store.write_atomic(collection, data)
    }

    pub fn sessions(&self) -> Result<SessionMap> {
        self.load(Collection::Sessions)
    }

    pub fn save_sessions(&self, sessions: &SessionMap) -> Result<()> {
        self.save(Collection::Sessions, sessions)
    }

    pub fn interactions(&self) -> Result<Vec<Interaction>> {
        self.load(Collection::Interactions)
    }

    pub fn issues(&self) -> Result<Vec<Issue>> {
        self.load(Collection::Issues)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions()?.remove(session_id))
    }

    pub fn put_session(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions()?;
        sessions.insert(session.id.clone(), session);
        self.save_sessions(&sessions)
    }

    pub fn append_interaction(&self, interaction: Interaction) -> Result<()> {
        let mut interactions = self.interactions()?;
        interactions.push(interaction);
        self.save(Collection::Interactions, &interactions)
    }

    pub fn append_issue(&self, issue: Issue) -> Result<()> {
        let mut issues = self.issues()?;
        issues.push(issue);
        self.save(Collection::Issues, &issues)
    }
}

fn write_then_rename(tmp_path: &Path, path: &Path, content: &[u8]) -> io::Result<()> {
    let mut tmp = File::create(tmp_path)?;
    tmp.write_all(content)?;
    tmp.sync_all()?;
    drop(tmp);
    fs::rename(tmp_path, path)
}

/// Move an unparsable file aside so the next save starts clean
fn backup_corrupt_file(path: &Path) -> io::Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%6f");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let backup = path.with_file_name(format!("{}.corrupt-{}", file_name, stamp));

    match fs::rename(path, &backup) {
        Ok(()) => Ok(backup),
        Err(e) => {
            warn!("Could not back up corrupt file {}: {}", path.display(), e);
            Err(e)
        }
    }
}
