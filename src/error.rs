use thiserror::Error;

/// Failures surfaced by the fetcher and stored on cache entries.
///
/// The enum is `Clone` because a single fetch result is shared by every
/// subscriber that joined the in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrawlError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Transport { status: Option<u16>, message: String },

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrawlError {
    /// Map a non-2xx reply to its place in the taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => TrawlError::Unauthenticated(message),
            404 => TrawlError::NotFound(message),
            _ => TrawlError::Transport {
                status: Some(status),
                message,
            },
        }
    }

    /// Terminal failures are surfaced but never revalidated automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrawlError::Unauthenticated(_) | TrawlError::NotFound(_)
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TrawlError::Unauthenticated(_) => Some(401),
            TrawlError::NotFound(_) => Some(404),
            TrawlError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TrawlError {
    fn from(err: reqwest::Error) -> Self {
        TrawlError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrawlError {
    fn from(err: serde_json::Error) -> Self {
        TrawlError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            TrawlError::from_status(404, "Run not found".into()),
            TrawlError::NotFound("Run not found".into())
        );
        assert!(TrawlError::from_status(401, "Unauthorized".into()).is_terminal());

        let err = TrawlError::from_status(503, "Service unavailable".into());
        assert!(!err.is_terminal());
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "Service unavailable");
    }
}
