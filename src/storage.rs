use crate::model::{CatalogEntry, EntryId, NewEntry};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("catalog file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Каталог аниме: вставка, поиск по id, поиск по подстроке, последние записи.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn insert(&self, entry: NewEntry) -> Result<CatalogEntry, StorageError>;
    async fn find(&self, id: EntryId) -> Result<Option<CatalogEntry>, StorageError>;
    /// Регистронезависимая подстрока по имени, сначала новые. Пустой запрос = `list_recent`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, StorageError>;
    async fn list_recent(&self, limit: usize) -> Result<Vec<CatalogEntry>, StorageError>;
}

/// Сохранённый список админов (bootstrap через /admin).
#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn admins(&self) -> Result<Vec<u64>, StorageError>;
    /// Добавляет `user`, только если список пуст. `true` — этот вызов выиграл.
    async fn claim_first_admin(&self, user: u64) -> Result<bool, StorageError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileState {
    version: u32,
    next_id: u64,
    // в порядке добавления
    entries: Vec<CatalogEntry>,
    #[serde(default)]
    admins: Vec<u64>,
}

impl Default for FileState {
    fn default() -> Self {
        Self { version: 1, next_id: 1, entries: Vec::new(), admins: Vec::new() }
    }
}

#[derive(Clone)]
pub struct Storage {
    inner: Arc<RwLock<FileState>>,
    path: PathBuf,
}

impl Storage {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        // ошибка проверки (права, EIO) = стоп, а не пустой каталог поверх живого файла
        let state = if fs::try_exists(&path).await? {
            let data = fs::read(&path).await?;
            // битый файл не перезаписываем пустым состоянием
            let mut s: FileState = serde_json::from_slice(&data)?;
            if s.version == 0 { s.version = 1; }
            let max_id = s.entries.iter().map(|e| e.id.0).max().unwrap_or(0);
            if s.next_id <= max_id { s.next_id = max_id + 1; }
            s
        } else {
            FileState::default()
        };
        tracing::info!(path = %path.display(), entries = state.entries.len(), "catalog loaded");
        Ok(Self { inner: Arc::new(RwLock::new(state)), path })
    }

    async fn flush_snapshot(&self, snapshot: Vec<u8>) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &snapshot).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for Storage {
    async fn insert(&self, entry: NewEntry) -> Result<CatalogEntry, StorageError> {
        // снапшот, запись и rename под одним write-локом: файлы не обгоняют друг друга
        let mut guard = self.inner.write().await;
        let id = EntryId(guard.next_id);
        let stored = entry.into_entry(id, Utc::now());
        guard.next_id += 1;
        guard.entries.push(stored.clone());
        let flushed = match serde_json::to_vec_pretty(&*guard) {
            Ok(snapshot) => self.flush_snapshot(snapshot).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = flushed {
            // откат: в памяти ровно то, что на диске
            guard.entries.pop();
            guard.next_id -= 1;
            return Err(e);
        }
        Ok(stored)
    }

    async fn find(&self, id: EntryId) -> Result<Option<CatalogEntry>, StorageError> {
        let guard = self.inner.read().await;
        Ok(guard.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, StorageError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.list_recent(limit).await;
        }
        let guard = self.inner.read().await;
        Ok(guard
            .entries
            .iter()
            .rev()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CatalogEntry>, StorageError> {
        let guard = self.inner.read().await;
        Ok(guard.entries.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl RosterStore for Storage {
    async fn admins(&self) -> Result<Vec<u64>, StorageError> {
        Ok(self.inner.read().await.admins.clone())
    }

    async fn claim_first_admin(&self, user: u64) -> Result<bool, StorageError> {
        // лок держим до конца записи: два bootstrap'а не должны пройти оба
        let mut guard = self.inner.write().await;
        if !guard.admins.is_empty() {
            return Ok(false);
        }
        guard.admins.push(user);
        let flushed = match serde_json::to_vec_pretty(&*guard) {
            Ok(snapshot) => self.flush_snapshot(snapshot).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = flushed {
            guard.admins.clear();
            return Err(e);
        }
        Ok(true)
    }
}
