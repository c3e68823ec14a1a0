use crate::registration::Session;
use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::time::Duration;

/// Хранилище незавершённых анкет, ключ — id чата.
/// Все операции атомарны по ключу.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, chat: i64) -> Option<Session>;
    /// `false`, если для чата уже есть сессия.
    async fn insert_if_absent(&self, chat: i64, session: Session) -> bool;
    /// Записывает `next`, только если сохранённая сессия ещё в ревизии `expected`.
    async fn compare_and_swap(&self, chat: i64, expected: u64, next: Session) -> bool;
    async fn remove(&self, chat: i64) -> Option<Session>;
}

/// Сессии в памяти процесса. Брошенные анкеты вытесняются после `idle` без активности.
#[derive(Clone)]
pub struct MemorySessions {
    cache: Cache<i64, Session>,
}

impl MemorySessions {
    pub fn new(idle: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_idle(idle)
            .eviction_listener(|chat, _session, cause| {
                tracing::info!(chat = *chat, ?cause, "registration session evicted");
            })
            .build();
        Self { cache }
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn get(&self, chat: i64) -> Option<Session> {
        self.cache.get(&chat).await
    }

    async fn insert_if_absent(&self, chat: i64, session: Session) -> bool {
        self.cache
            .entry(chat)
            .or_insert_with(async move { session })
            .await
            .is_fresh()
    }

    async fn compare_and_swap(&self, chat: i64, expected: u64, next: Session) -> bool {
        let result = self
            .cache
            .entry(chat)
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if entry.value().revision == expected => Op::Put(next),
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        matches!(result, CompResult::ReplacedWith(_))
    }

    async fn remove(&self, chat: i64) -> Option<Session> {
        self.cache.remove(&chat).await
    }
}
