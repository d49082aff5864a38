use thiserror::Error;

#[derive(Error, Debug)]
pub enum StudyError {
    #[error("No scheduling record for user {user} and card {card}")]
    NotFound { user: String, card: String },

    #[error("Scheduling record already exists for user {user} and card {card}")]
    AlreadyExists { user: String, card: String },

    #[error("Invalid quality: {0}")]
    InvalidQuality(String),

    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to lock {0}")]
    Lock(&'static str),
}

impl StudyError {
    pub(crate) fn not_found(user: &str, card: &str) -> Self {
        StudyError::NotFound {
            user: user.to_string(),
            card: card.to_string(),
        }
    }

    pub(crate) fn already_exists(user: &str, card: &str) -> Self {
        StudyError::AlreadyExists {
            user: user.to_string(),
            card: card.to_string(),
        }
    }

    /// HTTP-style status for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            StudyError::NotFound { .. } | StudyError::DeckNotFound(_) => 404,
            StudyError::AlreadyExists { .. } => 409,
            StudyError::InvalidQuality(_) | StudyError::InvalidSettings(_) => 400,
            StudyError::Io(_) | StudyError::Json(_) | StudyError::Lock(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, StudyError>;
