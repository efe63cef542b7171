//! Atomic JSON persistence for durable runtime artifacts.
//!
//! Every mutable config and state file in the runtime (task store, tool
//! config, MCP servers, permission overrides, session snapshots) goes
//! through [`save_json`] / [`load_json`].  Writes land in a temp file in
//! the target directory, are fsynced, then renamed over the destination,
//! so a crash mid-write leaves either the old file or the new one -
//! never a half-written hybrid.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

// ─── StorageError ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Parent directories are created as needed.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let body = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&body).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp, path).map_err(io_err)
}

/// Load and deserialize `path`.  A missing file is `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StorageError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Load `path`, falling back to `T::default()` (with a warning) when the
/// file is missing or corrupt.  Used by stores that must never fail boot.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match load_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            log::warn!("storage: falling back to defaults: {e}");
            T::default()
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        let doc = Doc {
            name: "alpha".into(),
            count: 3,
        };
        save_json(&path, &doc).unwrap();

        let loaded: Doc = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Doc> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let doc: Doc = load_json_or_default(&path);
        assert_eq!(doc, Doc::default());
    }

    #[test]
    fn save_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        save_json(&path, &Doc { name: "a".into(), count: 1 }).unwrap();
        save_json(&path, &Doc { name: "b".into(), count: 2 }).unwrap();

        let loaded: Doc = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded.name, "b");
        // No temp file left behind.
        assert!(!dir.path().join("doc.json.tmp").exists());
    }
}
