//! CLI error type and exit-code mapping.

use std::fmt::{self, Display, Formatter};

use revaer_test_support::HarnessError;

/// Failure surfaced to the operator.
#[derive(Debug)]
pub(crate) enum CliError {
    /// Bad input; exit code 2.
    Validation(String),
    /// Runtime failure; exit code 3.
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(error: HarnessError) -> Self {
        match error {
            HarnessError::InvalidEnv { name, value } => {
                Self::validation(format!("invalid value '{value}' for {name}"))
            }
            other => Self::failure(other),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(CliError::validation("bad").exit_code(), 2);
        assert_eq!(CliError::failure(anyhow::anyhow!("boom")).exit_code(), 3);
    }

    #[test]
    fn invalid_env_maps_to_validation() {
        let err = CliError::from(HarnessError::InvalidEnv {
            name: "REVAER_HARNESS_LISTEN_TIMEOUT_MS",
            value: "soon".to_string(),
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.display_message(),
            "invalid value 'soon' for REVAER_HARNESS_LISTEN_TIMEOUT_MS"
        );
    }

    #[test]
    fn failure_message_includes_source_chain() {
        let err = CliError::from(HarnessError::ChecksFailed { count: 2 });
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "harness checks failed");
    }
}
