use crate::access::AccessPolicy;
use crate::model::CatalogEntry;
use crate::registration::{Draft, Input, Rejection, Session, Signal, Step, StepOrder, Transition};
use crate::session::SessionStore;
use crate::storage::Catalog;
use std::sync::Arc;

/// Что показать владельцу анкеты на текущем шаге.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub step: Step,
    pub draft: Draft,
    /// `Some`, если последний ввод не принят.
    pub rejection: Option<Rejection>,
    pub can_go_back: bool,
    pub allow_edit: bool,
    pub order: StepOrder,
}

impl Prompt {
    fn of(session: &Session, rejection: Option<Rejection>) -> Self {
        Self {
            step: session.step,
            draft: session.draft.clone(),
            rejection,
            can_go_back: session.can_go_back(),
            allow_edit: session.allow_edit(),
            order: session.order(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Prompt(Prompt),
    Saved(CatalogEntry),
    Cancelled,
    Unauthorized,
    /// В этом чате анкета не открыта.
    NoSession,
    /// Сессию успели изменить параллельно; ввод не применён.
    Conflict,
    /// Ошибка каталога: анкета закрыта.
    Failed,
}

/// Анкета добавления: сессии + машина состояний + каталог + права.
pub struct Registrar {
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn Catalog>,
    policy: Arc<AccessPolicy>,
    order: StepOrder,
    allow_edit: bool,
}

impl Registrar {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn Catalog>,
        policy: Arc<AccessPolicy>,
        order: StepOrder,
        allow_edit: bool,
    ) -> Self {
        Self { sessions, catalog, policy, order, allow_edit }
    }

    pub async fn start(&self, chat: i64, user: u64) -> Reply {
        if !self.policy.is_authorized(user).await {
            tracing::info!(chat, user, "unauthorized registration attempt");
            return Reply::Unauthorized;
        }
        let fresh = Session::new(user, self.order, self.allow_edit);
        if self.sessions.insert_if_absent(chat, fresh.clone()).await {
            tracing::info!(chat, user, "registration started");
            return Reply::Prompt(Prompt::of(&fresh, None));
        }
        // уже идёт: повторяем текущий шаг
        match self.sessions.get(chat).await {
            Some(current) => Reply::Prompt(Prompt::of(&current, None)),
            None => Reply::Conflict,
        }
    }

    /// /cancel — команда админов: чужому отказ, даже когда отменять нечего.
    pub async fn cancel(&self, chat: i64, user: u64) -> Reply {
        if !self.policy.is_authorized(user).await {
            return Reply::Unauthorized;
        }
        self.handle(chat, user, Input::Signal(Signal::Cancel)).await
    }

    pub async fn handle(&self, chat: i64, user: u64, input: Input) -> Reply {
        let Some(current) = self.sessions.get(chat).await else {
            return Reply::NoSession;
        };
        if !self.policy.is_authorized(user).await {
            return Reply::Unauthorized;
        }

        let mut next = current.clone();
        match next.apply(user, input) {
            Transition::Rejected(reason) => {
                tracing::debug!(chat, user, ?reason, step = ?current.step, "input rejected");
                Reply::Prompt(Prompt::of(&current, Some(reason)))
            }
            Transition::Moved(step) => {
                if !self.sessions.compare_and_swap(chat, current.revision, next.clone()).await {
                    tracing::warn!(chat, "session changed concurrently");
                    return Reply::Conflict;
                }
                tracing::debug!(chat, ?step, "registration step");
                Reply::Prompt(Prompt::of(&next, None))
            }
            Transition::Cancelled => {
                self.sessions.remove(chat).await;
                tracing::info!(chat, user, "registration cancelled");
                Reply::Cancelled
            }
            Transition::Completed(entry) => {
                // сессию закрываем в любом случае: без автоповтора
                self.sessions.remove(chat).await;
                match self.catalog.insert(entry).await {
                    Ok(saved) => {
                        tracing::info!(chat, id = %saved.id, name = %saved.name, "entry saved");
                        Reply::Saved(saved)
                    }
                    Err(e) => {
                        tracing::error!(chat, error = %e, "failed to save entry");
                        Reply::Failed
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryId, NewEntry};
    use crate::registration::{Media, PhotoVariant};
    use crate::session::MemorySessions;
    use crate::storage::{Storage, StorageError};
    use async_trait::async_trait;
    use std::time::Duration;

    const ADMIN: u64 = 1;
    const CHAT: i64 = 100;

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: Arc<Storage>,
        sessions: Arc<MemorySessions>,
        registrar: Registrar,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path().join("catalog.json")).await.unwrap());
        let sessions = Arc::new(MemorySessions::new(Duration::from_secs(60)));
        let policy = Arc::new(AccessPolicy::load([ADMIN], storage.clone()).await.unwrap());
        let registrar =
            Registrar::new(sessions.clone(), storage.clone(), policy, StepOrder::VideoFirst, true);
        Fixture { _dir: dir, storage, sessions, registrar }
    }

    fn script() -> Vec<Input> {
        vec![
            Input::Media(Media::Video { file_id: "vid".into() }),
            Input::Text("Naruto".into()),
            Input::Text("220".into()),
            Input::Media(Media::Photo(vec![PhotoVariant { file_id: "poster".into(), width: 800, height: 600 }])),
            Input::Text("skip".into()),
        ]
    }

    async fn reach_confirm(f: &Fixture) {
        assert!(matches!(f.registrar.start(CHAT, ADMIN).await, Reply::Prompt(_)));
        for input in script() {
            assert!(matches!(f.registrar.handle(CHAT, ADMIN, input).await, Reply::Prompt(p) if p.rejection.is_none()));
        }
        assert_eq!(f.sessions.get(CHAT).await.unwrap().step, Step::Confirm);
    }

    #[tokio::test]
    async fn confirm_persists_exactly_one_entry_and_drops_session() {
        let f = fixture().await;
        reach_confirm(&f).await;

        let reply = f.registrar.handle(CHAT, ADMIN, Input::Signal(Signal::Confirm)).await;
        let Reply::Saved(saved) = &reply else { panic!("unexpected {reply:?}") };
        assert_eq!(saved.name, "Naruto");
        assert_eq!(saved.episode_count, 220);
        assert_eq!(saved.season, None);
        assert_eq!(saved.poster.as_deref(), Some("poster"));
        assert_eq!(saved.video.as_deref(), Some("vid"));

        assert!(f.sessions.get(CHAT).await.is_none());
        assert_eq!(f.storage.list_recent(10).await.unwrap(), vec![saved.clone()]);
    }

    #[tokio::test]
    async fn cancel_persists_nothing() {
        let f = fixture().await;
        reach_confirm(&f).await;
        assert_eq!(f.registrar.cancel(CHAT, ADMIN).await, Reply::Cancelled);
        assert!(f.sessions.get(CHAT).await.is_none());
        assert!(f.storage.list_recent(10).await.unwrap().is_empty());
        assert_eq!(f.registrar.cancel(CHAT, ADMIN).await, Reply::NoSession);
    }

    #[tokio::test]
    async fn unauthorized_user_changes_nothing() {
        let f = fixture().await;
        assert_eq!(f.registrar.start(CHAT, 99).await, Reply::Unauthorized);
        assert!(f.sessions.get(CHAT).await.is_none());

        reach_confirm(&f).await;
        let before = f.sessions.get(CHAT).await;
        assert_eq!(f.registrar.handle(CHAT, 99, Input::Signal(Signal::Confirm)).await, Reply::Unauthorized);
        assert_eq!(f.registrar.cancel(CHAT, 99).await, Reply::Unauthorized);
        assert_eq!(f.sessions.get(CHAT).await, before);
        assert!(f.storage.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_without_session_is_still_admin_only() {
        let f = fixture().await;
        assert_eq!(f.registrar.cancel(CHAT, 99).await, Reply::Unauthorized);
        assert_eq!(f.registrar.cancel(CHAT, ADMIN).await, Reply::NoSession);
    }

    #[tokio::test]
    async fn unsupported_message_reprompts_current_step() {
        let f = fixture().await;
        f.registrar.start(CHAT, ADMIN).await;
        let Reply::Prompt(p) = f.registrar.handle(CHAT, ADMIN, Input::Unsupported).await else { panic!() };
        assert_eq!(p.step, Step::AwaitingVideo);
        assert_eq!(p.rejection, Some(Rejection::ExpectedVideo));
    }

    #[tokio::test]
    async fn restart_keeps_current_step() {
        let f = fixture().await;
        f.registrar.start(CHAT, ADMIN).await;
        f.registrar.handle(CHAT, ADMIN, script().remove(0)).await;

        let Reply::Prompt(p) = f.registrar.start(CHAT, ADMIN).await else { panic!() };
        assert_eq!(p.step, Step::AwaitingName);
        assert_eq!(p.draft.video.as_deref(), Some("vid"));
    }

    #[tokio::test]
    async fn invalid_input_reprompts_same_step() {
        let f = fixture().await;
        f.registrar.start(CHAT, ADMIN).await;
        let Reply::Prompt(p) = f.registrar.handle(CHAT, ADMIN, Input::Text("no video".into())).await else {
            panic!()
        };
        assert_eq!(p.step, Step::AwaitingVideo);
        assert_eq!(p.rejection, Some(Rejection::ExpectedVideo));
        assert_eq!(f.sessions.get(CHAT).await.unwrap().revision, 0);
    }

    #[tokio::test]
    async fn text_without_session_is_ignored() {
        let f = fixture().await;
        assert_eq!(f.registrar.handle(CHAT, 99, Input::Text("hi".into())).await, Reply::NoSession);
    }

    struct BrokenCatalog;

    #[async_trait]
    impl Catalog for BrokenCatalog {
        async fn insert(&self, _: NewEntry) -> Result<CatalogEntry, StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }
        async fn find(&self, _: EntryId) -> Result<Option<CatalogEntry>, StorageError> {
            Ok(None)
        }
        async fn search(&self, _: &str, _: usize) -> Result<Vec<CatalogEntry>, StorageError> {
            Ok(vec![])
        }
        async fn list_recent(&self, _: usize) -> Result<Vec<CatalogEntry>, StorageError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn storage_failure_aborts_session() {
        let f = fixture().await;
        let policy = Arc::new(AccessPolicy::load([ADMIN], f.storage.clone()).await.unwrap());
        let broken = Registrar::new(f.sessions.clone(), Arc::new(BrokenCatalog), policy, StepOrder::VideoFirst, true);
        reach_confirm(&f).await;

        assert_eq!(broken.handle(CHAT, ADMIN, Input::Text("да".into())).await, Reply::Failed);
        assert!(f.sessions.get(CHAT).await.is_none());
    }
}
