use solfa_domain_score::ConfigError;
use solfa_infra_storage_fs::TimelineLoadError;
use solfa_ports::audio::AudioError;
use solfa_ports::playback::PlaybackError;
use solfa_ports::storage::StorageError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Timeline(#[from] TimelineLoadError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
