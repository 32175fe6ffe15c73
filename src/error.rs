use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("backend unavailable: {0}")]
    Unreachable(String),
    #[error("backend call `{0}` timed out")]
    TimedOut(&'static str),
    #[error("no active profile is defined")]
    NoActiveProfile,
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response from `{command}`: {detail}")]
    Malformed {
        command: &'static str,
        detail: String,
    },
}

impl BusError {
    pub fn malformed(command: &'static str, detail: impl ToString) -> Self {
        Self::Malformed {
            command,
            detail: detail.to_string(),
        }
    }

    /// Errors that mean "there is nothing to show" rather than a user mistake.
    pub fn is_empty_result(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::TimedOut(_) | Self::NoActiveProfile
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(String),
    #[error("either email and password or a token is required")]
    MissingCredentials,
    #[error("{0} cannot contain spaces")]
    ContainsWhitespace(&'static str),
    #[error("duration must be a positive number of minutes, got `{0}`")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PanelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Backend(#[from] BusError),
    #[error("unsupported panel action `{0}`")]
    UnknownAction(String),
}

#[cfg(test)]
mod tests {
    use super::{BusError, PanelError, ValidationError};

    #[test]
    fn rejection_text_is_shown_verbatim() {
        let error = BusError::Rejected("Login Failed".to_string());
        assert_eq!(error.to_string(), "Login Failed");
        assert!(!error.is_empty_result());
    }

    #[test]
    fn panel_error_wraps_validation_transparently() {
        let error = PanelError::from(ValidationError::MissingField("space".to_string()));
        assert_eq!(error.to_string(), "space is required");
    }
}
