// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! File-backed, time-boxed cache for remote API payloads.
//!
//! Each entry lives in its own `<sha256(key)>.json` file inside the cache
//! directory. The age of an entry is the age of its file, so rewriting an
//! entry refreshes it. Expired and unreadable entries are removed on read and
//! reported as misses; nothing in this module fails the caller except opening
//! the directory itself.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime}
};

use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{self, Error};

const ENTRY_EXTENSION: &str = "json";
const GITIGNORE_CONTENTS: &str = "*\n!.gitignore\n";

/// Snapshot of the cache directory contents.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheInfo {
    /// Number of stored entries.
    pub entry_count:      usize,
    /// Sum of the entry file sizes.
    pub total_size_bytes: u64,
    /// Directory holding the entries.
    pub directory:        PathBuf
}

/// Content-addressed cache store rooted at a directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    directory: PathBuf
}

impl CacheStore {
    /// Opens (and creates if needed) the cache directory.
    ///
    /// A `.gitignore` marker excluding the directory from version control is
    /// written the first time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheIo`] when the directory or marker cannot be
    /// created.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, Error> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .map_err(|source| error::cache_io_error(&directory, source))?;

        let marker = directory.join(".gitignore");
        if !marker.exists() {
            fs::write(&marker, GITIGNORE_CONTENTS)
                .map_err(|source| error::cache_io_error(&marker, source))?;
        }

        Ok(Self {
            directory
        })
    }

    /// Directory holding the entries.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the stored payload when it is younger than `max_age_hours`.
    ///
    /// Ages are compared in whole seconds, so an entry written in the current
    /// second is a hit even with a zero max age.
    pub fn get<T>(&self, key: &str, max_age_hours: u64) -> Option<T>
    where
        T: DeserializeOwned
    {
        let path = self.entry_path(key);
        let modified = fs::metadata(&path).and_then(|meta| meta.modified()).ok()?;

        let age = SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO);
        if age.as_secs() > max_age_hours.saturating_mul(3600) {
            debug!("Cache entry for '{}' expired ({}s old)", key, age.as_secs());
            remove_entry(&path);
            return None;
        }

        let decoded = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|contents| serde_json::from_str::<T>(&contents).map_err(|e| e.to_string()));

        match decoded {
            Ok(payload) => Some(payload),
            Err(reason) => {
                warn!("Discarding unreadable cache entry for '{}': {}", key, reason);
                remove_entry(&path);
                None
            }
        }
    }

    /// Stores `payload` under `key`, replacing any previous entry.
    ///
    /// Returns `false` instead of failing when the payload cannot be
    /// serialized or the file cannot be written.
    pub fn set<T>(&self, key: &str, payload: &T) -> bool
    where
        T: Serialize + ?Sized
    {
        let json = match serde_json::to_string_pretty(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!("Cannot serialize cache entry for '{}': {}", key, e);
                return false;
            }
        };

        let path = self.entry_path(key);
        let temp_path = path.with_extension("tmp");
        let written = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, &path));

        match written {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot write cache entry for '{}': {}", key, e);
                let _ = fs::remove_file(&temp_path);
                false
            }
        }
    }

    /// Removes the entry stored under `key`. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        fs::remove_file(self.entry_path(key)).is_ok()
    }

    /// Removes every entry and returns how many were deleted.
    pub fn clear(&self) -> usize {
        self.entry_files()
            .into_iter()
            .filter(|path| fs::remove_file(path).is_ok())
            .count()
    }

    /// Reports the number of entries and their total size.
    pub fn info(&self) -> CacheInfo {
        let entries = self.entry_files();
        let total_size_bytes = entries
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum();

        CacheInfo {
            entry_count: entries.len(),
            total_size_bytes,
            directory: fs::canonicalize(&self.directory).unwrap_or_else(|_| self.directory.clone())
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.{ENTRY_EXTENSION}", cache_key(key)))
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.directory) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
            })
            .collect()
    }
}

/// Derives the filesystem-safe identifier of a cache key.
pub fn cache_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn remove_entry(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Cannot remove cache entry {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Payload {
        name:  String,
        stars: u64
    }

    fn age_entry(store: &CacheStore, key: &str, age: Duration) {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(store.entry_path(key))
            .expect("entry exists");
        file.set_modified(SystemTime::now() - age).expect("set mtime");
    }

    #[test]
    fn open_writes_gitignore_marker() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path().join("cache")).expect("open");

        let marker = fs::read_to_string(store.directory().join(".gitignore")).expect("marker");
        assert_eq!(marker, "*\n!.gitignore\n");
        assert_eq!(store.info().entry_count, 0);
    }

    #[test]
    fn set_then_get_returns_equal_payload() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        let payload = vec![Payload {
            name:  "octocat/hello".to_owned(),
            stars: 3
        }];

        assert!(store.set("repos_octocat", &payload));
        let cached: Option<Vec<Payload>> = store.get("repos_octocat", 24);
        assert_eq!(cached, Some(payload.clone()));

        let fresh: Option<Vec<Payload>> = store.get("repos_octocat", 0);
        assert_eq!(fresh, Some(payload));
    }

    #[test]
    fn get_on_missing_key_is_absent() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        assert!(store.get::<Payload>("missing", 24).is_none());
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        assert!(store.set("old", &1_u32));
        assert!(store.set("young", &2_u32));
        age_entry(&store, "old", Duration::from_secs(2 * 3600));
        assert_eq!(store.info().entry_count, 2);

        assert!(store.get::<u32>("old", 1).is_none());
        assert_eq!(store.info().entry_count, 1);
        assert_eq!(store.get::<u32>("young", 1), Some(2));
    }

    #[test]
    fn corrupted_entry_is_treated_as_miss_and_deleted() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        fs::write(store.entry_path("broken"), "{not json").expect("write");

        assert!(store.get::<Payload>("broken", 24).is_none());
        assert!(!store.entry_path("broken").exists());
    }

    #[test]
    fn mismatched_payload_shape_is_treated_as_corruption() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        assert!(store.set("shape", &"just a string"));

        assert!(store.get::<Payload>("shape", 24).is_none());
        assert_eq!(store.info().entry_count, 0);
    }

    #[test]
    fn unserializable_payload_reports_failure() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        let payload: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);

        assert!(!store.set("tuple-keys", &payload));
        assert_eq!(store.info().entry_count, 0);
    }

    #[test]
    fn set_overwrites_previous_entry() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        assert!(store.set("key", &1_u32));
        assert!(store.set("key", &2_u32));

        assert_eq!(store.get::<u32>("key", 24), Some(2));
        assert_eq!(store.info().entry_count, 1);
    }

    #[test]
    fn delete_reports_whether_entry_existed() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        assert!(store.set("key", &true));

        assert!(store.delete("key"));
        assert!(!store.delete("key"));
    }

    #[test]
    fn clear_removes_entries_but_keeps_marker() {
        let temp = tempdir().expect("failed to create tempdir");
        let store = CacheStore::open(temp.path()).expect("open");
        for key in ["a", "b", "c"] {
            assert!(store.set(key, key));
        }

        let info = store.info();
        assert_eq!(info.entry_count, 3);
        assert!(info.total_size_bytes > 0);

        assert_eq!(store.clear(), 3);
        assert_eq!(store.info().entry_count, 0);
        assert!(store.directory().join(".gitignore").exists());
    }

    #[test]
    fn cache_key_is_hex_sha256() {
        let key = cache_key("repos_octocat");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn cache_key_is_deterministic(input in ".{0,64}") {
            prop_assert_eq!(cache_key(&input), cache_key(&input));
        }

        #[test]
        fn distinct_keys_address_distinct_entries(a in "[a-z_]{1,24}", b in "[a-z_]{1,24}") {
            prop_assume!(a != b);
            prop_assert_ne!(cache_key(&a), cache_key(&b));
        }
    }
}
