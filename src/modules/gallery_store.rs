use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use crate::error::errors::StorageError;
use crate::modules::face_id_client::Embedding;

const USERS_DIR: &str = "users";
const USER_FILE_EXT: &str = "json";

/// UserFaceData is everything stored for one enrolled user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserFaceData {
    pub username: String,
    pub embeddings: Vec<Embedding>,
    pub enrolled_at: SystemTime,
    pub last_used: SystemTime,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl UserFaceData {
    pub fn new(username: &str, embeddings: Vec<Embedding>, metadata: HashMap<String, String>) -> Self {
        let now = SystemTime::now();
        UserFaceData {
            username: username.to_string(),
            embeddings,
            enrolled_at: now,
            last_used: now,
            metadata,
        }
    }
}

/// GalleryStore persists enrolled embeddings per user.
///
/// Implementations must keep writes to a user's record from racing a read of
/// the same record.
pub trait GalleryStore: Send + Sync {
    fn user_exists(&self, username: &str) -> bool;

    fn load_user(&self, username: &str) -> Result<UserFaceData, StorageError>;

    /// create_user enrolls a new user, failing with `UserExists` for a known name.
    fn create_user(
        &self,
        username: &str,
        embeddings: Vec<Embedding>,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError>;

    /// add_embedding appends an embedding and touches the last-used time.
    fn add_embedding(&self, username: &str, embedding: Embedding) -> Result<(), StorageError>;

    fn update_last_used(&self, username: &str) -> Result<(), StorageError>;

    fn delete_user(&self, username: &str) -> Result<(), StorageError>;

    fn list_users(&self) -> Result<Vec<String>, StorageError>;
}

/// MemoryGalleryStore keeps every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryGalleryStore {
    users: RwLock<HashMap<String, UserFaceData>>,
}

impl MemoryGalleryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify<F>(&self, username: &str, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut UserFaceData),
    {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let user = users
            .get_mut(username)
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))?;
        f(user);
        Ok(())
    }
}

impl GalleryStore for MemoryGalleryStore {
    fn user_exists(&self, username: &str) -> bool {
        self.users.read().unwrap_or_else(PoisonError::into_inner).contains_key(username)
    }

    fn load_user(&self, username: &str) -> Result<UserFaceData, StorageError> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))
    }

    fn create_user(
        &self,
        username: &str,
        embeddings: Vec<Embedding>,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        if users.contains_key(username) {
            return Err(StorageError::UserExists(username.to_string()));
        }
        users.insert(username.to_string(), UserFaceData::new(username, embeddings, metadata));
        Ok(())
    }

    fn add_embedding(&self, username: &str, embedding: Embedding) -> Result<(), StorageError> {
        self.modify(username, |user| {
            user.embeddings.push(embedding);
            user.last_used = SystemTime::now();
        })
    }

    fn update_last_used(&self, username: &str) -> Result<(), StorageError> {
        self.modify(username, |user| user.last_used = SystemTime::now())
    }

    fn delete_user(&self, username: &str) -> Result<(), StorageError> {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| StorageError::UserNotFound(username.to_string()))
    }

    fn list_users(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

/// FileGalleryStore keeps one JSON document per user under `<data_dir>/users/`.
#[derive(Debug)]
pub struct FileGalleryStore {
    users_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl FileGalleryStore {
    /// new opens the store, creating the users directory when missing.
    ///
    /// # Arguments
    /// * `data_dir` - base data directory
    ///
    /// # Returns
    /// * `Result<FileGalleryStore>`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let users_dir = data_dir.as_ref().join(USERS_DIR);
        fs::create_dir_all(&users_dir)
            .with_context(|| format!("failed to create users directory {}", users_dir.display()))?;
        Ok(FileGalleryStore {
            users_dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn user_path(&self, username: &str) -> Result<PathBuf, StorageError> {
        validate_username(username)?;
        Ok(self.users_dir.join(format!("{username}.{USER_FILE_EXT}")))
    }

    /// user_lock returns the lock guarding one user's document.
    fn user_lock(&self, username: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(username.to_string()).or_default().clone()
    }

    fn read_user(&self, path: &Path, username: &str) -> Result<UserFaceData, StorageError> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::UserNotFound(username.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let user = serde_json::from_slice(&data)?;
        debug!("loaded user data for: {username}");
        Ok(user)
    }

    fn write_user(&self, path: &Path, user: &UserFaceData) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(user)?;
        fs::write(path, data)?;
        debug!("saved user data for: {}", user.username);
        Ok(())
    }

    fn modify<F>(&self, username: &str, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut UserFaceData),
    {
        let path = self.user_path(username)?;
        let lock = self.user_lock(username);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut user = self.read_user(&path, username)?;
        f(&mut user);
        self.write_user(&path, &user)
    }
}

impl GalleryStore for FileGalleryStore {
    fn user_exists(&self, username: &str) -> bool {
        self.user_path(username).map(|path| path.is_file()).unwrap_or(false)
    }

    fn load_user(&self, username: &str) -> Result<UserFaceData, StorageError> {
        let path = self.user_path(username)?;
        let lock = self.user_lock(username);
        let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);
        self.read_user(&path, username)
    }

    fn create_user(
        &self,
        username: &str,
        embeddings: Vec<Embedding>,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let path = self.user_path(username)?;
        let lock = self.user_lock(username);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
        if path.exists() {
            return Err(StorageError::UserExists(username.to_string()));
        }
        self.write_user(&path, &UserFaceData::new(username, embeddings, metadata))?;
        info!("enrolled user: {username}");
        Ok(())
    }

    fn add_embedding(&self, username: &str, embedding: Embedding) -> Result<(), StorageError> {
        self.modify(username, |user| {
            user.embeddings.push(embedding);
            user.last_used = SystemTime::now();
        })
    }

    fn update_last_used(&self, username: &str) -> Result<(), StorageError> {
        self.modify(username, |user| user.last_used = SystemTime::now())
    }

    fn delete_user(&self, username: &str) -> Result<(), StorageError> {
        let path = self.user_path(username)?;
        let lock = self.user_lock(username);
        let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("deleted user data for: {username}");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::UserNotFound(username.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    fn list_users(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.users_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some(USER_FILE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// validate_username rejects names that could escape the users directory.
fn validate_username(username: &str) -> Result<(), StorageError> {
    let invalid = username.is_empty()
        || username.starts_with('.')
        || username.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidUsername(username.to_string()));
    }
    Ok(())
}
