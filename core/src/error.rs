use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettleError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No exchange rates available for scope '{scope}'")]
    MissingRate { scope: String },

    #[error("Period lock held: {operation} already in progress by {holder}")]
    LockHeld { operation: String, holder: String },

    #[error("Operation out of order: period is '{actual}', expected '{expected}'")]
    Precedence { expected: String, actual: String },

    #[error("Archive incomplete: {} model(s) failed", .failed.len())]
    PartialArchive { failed: Vec<String> },

    #[error("Validation failed: {}", .reasons.join("; "))]
    Validation { reasons: Vec<String> },

    #[error("Platform '{platform_id}' is frozen for model '{model_id}'")]
    Frozen {
        model_id: String,
        platform_id: String,
    },

    #[error("Unknown period '{period}'")]
    UnknownPeriod { period: String },

    #[error("Invalid period date '{date}': must start on day 1 or 16")]
    InvalidPeriodDate { date: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SettleResult<T> = Result<T, SettleError>;
