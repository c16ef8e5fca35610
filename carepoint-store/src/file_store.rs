use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use carepoint_core::{CoreError, CoreResult, KeyValueStore};
use tracing::debug;

/// Durable key-value store: one JSON file per key under a directory.
/// Writes go through a temporary file and a rename so a crash never leaves a
/// half-written record behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> CoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| CoreError::StorageError(format!("Cannot create {}: {}", dir.display(), e)))?;
        debug!("File store at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::StorageError(format!("Read of {} failed: {}", key, e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| CoreError::StorageError(format!("Write of {} failed: {}", key, e)))
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::StorageError(format!("Removal of {} failed: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepoint_core::{Session, SessionStore, SESSION_KEY};
    use std::sync::Arc;

    fn scratch() -> PathBuf {
        std::env::temp_dir().join(format!("carepoint-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_set_get_remove() {
        let dir = scratch();
        let store = FileStore::open(&dir).unwrap();

        assert_eq!(store.get("carepoint.session").unwrap(), None);
        store.set("carepoint.session", "{\"a\":1}").unwrap();
        assert_eq!(store.get("carepoint.session").unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(dir.join("carepoint.session.json").exists());

        store.remove("carepoint.session").unwrap();
        store.remove("carepoint.session").unwrap();
        assert_eq!(store.get("carepoint.session").unwrap(), None);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_session_survives_reopen() {
        let dir = scratch();
        let session = Session {
            subject_id: Some("pat-1".to_string()),
            email: "pat@example.com".to_string(),
            id_token: "a.b.c".into(),
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            groups: ["PATIENT".to_string()].into_iter().collect(),
            expires_at: Some(chrono::Utc::now().timestamp() + 600),
            given_name: None,
            family_name: None,
        };

        SessionStore::new(Arc::new(FileStore::open(&dir).unwrap()))
            .persist(&session)
            .unwrap();

        let reopened = FileStore::open(&dir).unwrap();
        assert!(reopened.get(SESSION_KEY).unwrap().is_some());
        assert_eq!(SessionStore::new(Arc::new(reopened)).load(), Some(session));

        fs::remove_dir_all(dir).ok();
    }
}
