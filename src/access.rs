use crate::storage::{RosterStore, StorageError};
use std::{collections::HashSet, sync::Arc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    /// Пользователь стал первым админом.
    Granted,
    AlreadyAdmin,
    /// Список админов уже не пуст.
    Closed,
}

/// Кто может добавлять аниме и смотреть список.
/// Админы = `ADMIN_IDS` из конфига + сохранённые через /admin.
pub struct AccessPolicy {
    members: RwLock<HashSet<u64>>,
    roster: Arc<dyn RosterStore>,
}

impl AccessPolicy {
    /// Загружает сохранённый список один раз при старте.
    pub async fn load(
        configured: impl IntoIterator<Item = u64>,
        roster: Arc<dyn RosterStore>,
    ) -> Result<Self, StorageError> {
        let mut members: HashSet<u64> = configured.into_iter().collect();
        members.extend(roster.admins().await?);
        tracing::info!(admins = members.len(), "access roster loaded");
        Ok(Self { members: RwLock::new(members), roster })
    }

    pub async fn is_authorized(&self, user: u64) -> bool {
        self.members.read().await.contains(&user)
    }

    /// Первый вызвавший при пустом списке становится админом. Срабатывает не больше одного раза.
    pub async fn bootstrap(&self, user: u64) -> Result<Bootstrap, StorageError> {
        // write-лок сериализует попытки внутри процесса, claim_first_admin — в хранилище
        let mut members = self.members.write().await;
        if members.contains(&user) {
            return Ok(Bootstrap::AlreadyAdmin);
        }
        if !members.is_empty() {
            return Ok(Bootstrap::Closed);
        }
        if self.roster.claim_first_admin(user).await? {
            members.insert(user);
            tracing::info!(user, "first admin bootstrapped");
            Ok(Bootstrap::Granted)
        } else {
            members.extend(self.roster.admins().await?);
            Ok(Bootstrap::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn storage() -> (tempfile::TempDir, Arc<Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("catalog.json")).await.unwrap();
        (dir, Arc::new(storage))
    }

    #[tokio::test]
    async fn configured_admins_are_authorized() {
        let (_dir, storage) = storage().await;
        let policy = AccessPolicy::load([5, 6], storage).await.unwrap();
        assert!(policy.is_authorized(5).await);
        assert!(!policy.is_authorized(7).await);
    }

    #[tokio::test]
    async fn bootstrap_is_closed_when_roster_is_configured() {
        let (_dir, storage) = storage().await;
        let policy = AccessPolicy::load([5], storage.clone()).await.unwrap();
        assert_eq!(policy.bootstrap(9).await.unwrap(), Bootstrap::Closed);
        assert_eq!(policy.bootstrap(5).await.unwrap(), Bootstrap::AlreadyAdmin);
        assert!(!policy.is_authorized(9).await);
        assert!(storage.admins().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_bootstrap_has_single_winner() {
        let (_dir, storage) = storage().await;
        let policy = Arc::new(AccessPolicy::load([], storage.clone()).await.unwrap());

        let tasks: Vec<_> = (1..=8u64)
            .map(|user| {
                let policy = policy.clone();
                tokio::spawn(async move { policy.bootstrap(user).await.unwrap() })
            })
            .collect();
        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() == Bootstrap::Granted {
                granted += 1;
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(storage.admins().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bootstrapped_admin_is_restored_on_reload() {
        let (_dir, storage) = storage().await;
        {
            let policy = AccessPolicy::load([], storage.clone()).await.unwrap();
            assert_eq!(policy.bootstrap(3).await.unwrap(), Bootstrap::Granted);
        }
        let policy = AccessPolicy::load([], storage).await.unwrap();
        assert!(policy.is_authorized(3).await);
        assert_eq!(policy.bootstrap(4).await.unwrap(), Bootstrap::Closed);
    }
}
