use quotefetch_core::{JobError, SchedulerError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("strict mode failed: {failures} unresolved contracts or expirations")]
    StrictModeViolation { failures: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SchedulerError> for CliError {
    fn from(error: SchedulerError) -> Self {
        Self::Job(JobError::Scheduler(error))
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) => 2,
            Self::Job(JobError::Validation(_)) => 2,
            Self::Job(_) => 3,
            Self::Serialization(_) => 4,
            Self::StrictModeViolation { .. } => 5,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_user_errors_from_run_failures() {
        assert_eq!(CliError::from(ValidationError::EmptyRoot).exit_code(), 2);
        assert_eq!(
            CliError::from(JobError::Validation(ValidationError::EmptyRoot)).exit_code(),
            2
        );
        assert_eq!(
            CliError::from(SchedulerError::InvalidConfig {
                reason: String::from("batch_size must be at least 1"),
            })
            .exit_code(),
            3
        );
        assert_eq!(CliError::StrictModeViolation { failures: 2 }.exit_code(), 5);
        assert_eq!(
            CliError::from(std::io::Error::other("disk full")).exit_code(),
            10
        );
    }
}
