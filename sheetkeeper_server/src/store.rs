// File-backed campaign store.
//
// One `CampaignStore` serves one campaign for the life of the process and is
// shared by every connection thread behind an `Arc`. Layout under the data
// root:
//
//   Data/<campaign>/<character key>   character record JSON
//   MetaData/<campaign>/meta          {player name → character name} JSON
//
// A character key is the character name with all whitespace removed. Two
// names with the same key are the same character.
//
// Locking. The store owns two kinds of mutex, and no code path ever holds
// both at once:
//
// - `metadata_lock` guards the metadata blob. Plain reads and writes take it
//   for the duration of the file operation; `update_metadata` holds it across
//   a whole read → check → write span so concurrent PICKs serialize.
// - `character_locks` is an arena of per-key mutexes, created on first use
//   and never removed. Every character read and write takes the lock for its
//   key, so a reader never observes a half-written record.
//
// `create_character_if_absent` runs inside the metadata span (PICK creates
// the record it assigns) and therefore does not take a character lock; it
// relies on `create_new`, which the file system performs atomically, so it
// can never clobber an existing record.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sheetkeeper_sheet::CharacterRecord;

use crate::error::StoreError;

pub const DATA_DIR: &str = "Data";
pub const METADATA_DIR: &str = "MetaData";
pub const METADATA_FILE: &str = "meta";

/// Player name → name of the character that player owns.
pub type Metadata = BTreeMap<String, String>;

/// Storage key for a character name: the name with whitespace stripped.
///
/// Rejects names that would not be a single plain file name.
pub fn character_key(name: &str) -> Result<String, StoreError> {
    let key: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    if !is_plain_component(&key) {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(key)
}

fn is_plain_component(component: &str) -> bool {
    !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains(['/', '\\', '\0'])
}

/// Names of all campaigns that have a data directory under `data_root`.
pub fn list_campaigns_in(data_root: &Path) -> Result<Vec<String>, StoreError> {
    let dir = data_root.join(DATA_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    list_entries(&dir, |file_type| file_type.is_dir())
}

/// Sorted UTF-8 names of the entries in `dir` whose type passes `keep`.
fn list_entries(
    dir: &Path,
    keep: impl Fn(&fs::FileType) -> bool,
) -> Result<Vec<String>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| StoreError::io(entry.path(), e))?;
        if !keep(&file_type) {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Write `bytes` into a file that was just created at `path`. On failure
/// the file is removed again, since a truncated record would make every
/// later create of the same key report that it already exists.
fn fill_new_file(mut file: impl Write, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let written = file.write_all(bytes).and_then(|()| file.flush());
    drop(file);
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %cleanup, "could not remove partial record");
        }
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The guarded data is `()` or a lock table that is valid after any
    // panic, so a poisoned lock is still usable.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persistent state of the single campaign this process serves.
pub struct CampaignStore {
    campaign: String,
    data_root: PathBuf,
    characters_dir: PathBuf,
    metadata_path: PathBuf,
    metadata_lock: Mutex<()>,
    character_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CampaignStore {
    /// Open `campaign` under `data_root`, creating its directories if this is
    /// the first time it is served.
    pub fn open(data_root: impl Into<PathBuf>, campaign: &str) -> Result<Self, StoreError> {
        if !is_plain_component(campaign) {
            return Err(StoreError::InvalidName(campaign.to_owned()));
        }

        let data_root = data_root.into();
        let characters_dir = data_root.join(DATA_DIR).join(campaign);
        let metadata_dir = data_root.join(METADATA_DIR).join(campaign);
        fs::create_dir_all(&characters_dir).map_err(|e| StoreError::io(&characters_dir, e))?;
        fs::create_dir_all(&metadata_dir).map_err(|e| StoreError::io(&metadata_dir, e))?;

        tracing::info!(campaign, root = %data_root.display(), "opened campaign");

        Ok(Self {
            campaign: campaign.to_owned(),
            data_root,
            characters_dir,
            metadata_path: metadata_dir.join(METADATA_FILE),
            metadata_lock: Mutex::new(()),
            character_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn campaign(&self) -> &str {
        &self.campaign
    }

    /// All campaigns under this store's data root, including this one.
    pub fn list_campaigns(&self) -> Result<Vec<String>, StoreError> {
        list_campaigns_in(&self.data_root)
    }

    /// Keys of every stored character in this campaign, sorted.
    pub fn list_characters(&self) -> Result<Vec<String>, StoreError> {
        list_entries(&self.characters_dir, |file_type| file_type.is_file())
    }

    /// Load a character by name (or key). Derived values are recomputed.
    pub fn read_character(&self, name: &str) -> Result<CharacterRecord, StoreError> {
        let key = character_key(name)?;
        let path = self.characters_dir.join(&key);
        let key_lock = self.character_lock(&key);
        let _guard = lock(&key_lock);

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_owned()));
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        CharacterRecord::from_json(&json).map_err(|e| StoreError::corrupt(path, e))
    }

    /// Store a character under its own name's key, replacing any previous
    /// version.
    pub fn write_character(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let key = character_key(record.name())?;
        let path = self.characters_dir.join(&key);
        let json = record.to_json().map_err(|e| StoreError::corrupt(&path, e))?;
        let key_lock = self.character_lock(&key);
        let _guard = lock(&key_lock);

        fs::write(&path, json).map_err(|e| StoreError::io(path, e))
    }

    /// Store a character only if no record with its key exists. Returns
    /// whether the record was written.
    pub fn create_character_if_absent(&self, record: &CharacterRecord) -> Result<bool, StoreError> {
        let key = character_key(record.name())?;
        let path = self.characters_dir.join(&key);
        let json = record.to_json().map_err(|e| StoreError::corrupt(&path, e))?;

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        fill_new_file(file, &path, json.as_bytes())?;
        tracing::debug!(character = record.name(), "created character");
        Ok(true)
    }

    /// Current assignments; empty if none were ever written.
    pub fn read_metadata(&self) -> Result<Metadata, StoreError> {
        let _guard = lock(&self.metadata_lock);
        self.load_metadata()
    }

    /// Replace the assignments wholesale.
    pub fn write_metadata(&self, metadata: &Metadata) -> Result<(), StoreError> {
        let _guard = lock(&self.metadata_lock);
        self.save_metadata(metadata)
    }

    /// Read the assignments, let `update` inspect and change them, and write
    /// them back, all under the metadata lock. If `update` returns an error
    /// nothing is written.
    pub fn update_metadata<T, E>(
        &self,
        update: impl FnOnce(&mut Metadata) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = lock(&self.metadata_lock);
        let mut metadata = self.load_metadata()?;
        let value = update(&mut metadata)?;
        self.save_metadata(&metadata)?;
        Ok(value)
    }

    fn load_metadata(&self) -> Result<Metadata, StoreError> {
        let path = &self.metadata_path;
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| StoreError::corrupt(path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Metadata::new()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn save_metadata(&self, metadata: &Metadata) -> Result<(), StoreError> {
        let path = &self.metadata_path;
        let json = serde_json::to_string(metadata).map_err(|e| StoreError::corrupt(path, e))?;
        fs::write(path, json).map_err(|e| StoreError::io(path, e))
    }

    fn character_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.character_locks);
        Arc::clone(locks.entry(key.to_owned()).or_default())
    }
}
