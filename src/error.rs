use crate::storage::StorageError;
use thiserror::Error;

/// Ошибка обработчика апдейта. Логируется диспетчером, на другие чаты не влияет.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type HandlerResult = Result<(), HandlerError>;
