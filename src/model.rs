use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Идентификатор записи каталога. Выдаётся хранилищем, после создания не меняется.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: EntryId,
    pub name: String,
    pub season: Option<u32>,
    /// 0 — количество серий неизвестно.
    #[serde(default)]
    pub episode_count: u32,
    /// file_id постера в Telegram
    pub poster: Option<String>,
    /// file_id видео в Telegram
    pub video: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Полностью собранный черновик, готовый к сохранению.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub name: String,
    pub season: Option<u32>,
    pub episode_count: u32,
    pub poster: Option<String>,
    pub video: Option<String>,
}

impl NewEntry {
    pub fn into_entry(self, id: EntryId, created_at: DateTime<Utc>) -> CatalogEntry {
        CatalogEntry {
            id,
            name: self.name,
            season: self.season,
            episode_count: self.episode_count,
            poster: self.poster,
            video: self.video,
            created_at,
        }
    }
}
