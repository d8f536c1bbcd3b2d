use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the core. Every variant is caught by the caller and
/// turned into a message via [`Error::user_message`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl Error {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn malformed(err: impl std::fmt::Display) -> Self {
        Self::MalformedResponse(err.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => "Could not reach the service. Please try again.".to_string(),
            Self::MalformedResponse(_) => {
                "The vision board could not be analyzed. Please try another image.".to_string()
            }
            Self::Validation(msg) => msg.clone(),
            Self::NotAuthenticated => "Please sign in to continue.".to_string(),
            Self::NotFound { kind, .. } => format!("That {kind} no longer exists."),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("datastore encoding: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_passes_through() {
        let err = Error::validation("Goal title cannot be empty");
        assert_eq!(err.user_message(), "Goal title cannot be empty");
    }

    #[test]
    fn not_found_names_the_kind() {
        let err = Error::not_found("goal", "goal-9");
        assert_eq!(err.to_string(), "goal not found: goal-9");
        assert_eq!(err.user_message(), "That goal no longer exists.");
    }
}
