#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("notification error: {0}")]
    Notify(#[from] notify_realtime::Error),
}

pub type WatchResult<T> = Result<T, WatchError>;
