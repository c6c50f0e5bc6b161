use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The namespace is outside of the set this resolver may read.
    #[error("namespace {0} is not accessible")]
    NamespaceNotAccessible(String),

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("resources were not fetched within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(kind: impl ToString, name: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
