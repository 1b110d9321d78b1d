use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Skill not found: {input}")]
    SkillNotFound { input: String },

    #[error("Conflict on {entity}: {detail}")]
    Conflict { entity: Uuid, detail: String },

    #[error("Hold {hold_id} has expired")]
    Expired { hold_id: Uuid },

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: Uuid },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Engine is shutting down, no new holds accepted")]
    ShuttingDown,

    #[error("Transient backing-index failure: {context}")]
    Transient { context: &'static str },
}

impl Error {
    pub fn not_found(what: &'static str, id: Uuid) -> Self {
        Error::NotFound { what, id }
    }

    /// Usually the contended worker; for job-state clashes, the job.
    pub fn conflict(entity: Uuid, detail: impl Into<String>) -> Self {
        Error::Conflict {
            entity,
            detail: detail.into(),
        }
    }

    /// Hold contention is a re-offer-to-next-candidate signal, not a fatal error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }
}
