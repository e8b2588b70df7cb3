use thiserror::Error;

/// Validation errors for domain values, contract construction, and configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("root cannot be empty")]
    EmptyRoot,
    #[error("root length {len} exceeds the OCC maximum of {max}")]
    RootTooLong { len: usize, max: usize },
    #[error("root must start with an ASCII letter: '{ch}'")]
    RootInvalidStart { ch: char },
    #[error("root contains invalid character '{ch}' at index {index}")]
    RootInvalidChar { ch: char, index: usize },

    #[error("date must be YYYYMMDD or YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("start_date {start} must not be after end_date {end}")]
    InvalidDateRange { start: String, end: String },
    #[error("end_date {end} must not be after expiration {expiry}")]
    RangeAfterExpiry { end: String, expiry: String },

    #[error("strike must be a non-negative finite number: '{value}'")]
    InvalidStrike { value: String },
    #[error("right must contain C (call) or P (put): '{value}'")]
    InvalidRight { value: String },

    #[error("unknown operation '{value}'")]
    UnknownOperation { value: String },
    #[error("unknown data kind '{value}'")]
    UnknownDataKind { value: String },
    #[error("operation '{operation}' requires parameter '{param}'")]
    MissingParam {
        operation: String,
        param: &'static str,
    },
    #[error("operation '{operation}' requires an expiration")]
    ExpiryRequired { operation: String },
    #[error("operation '{operation}' requires a strike and a right")]
    LegRequired { operation: String },
    #[error("operation '{operation}' does not accept {field}")]
    UnexpectedField {
        operation: String,
        field: &'static str,
    },

    #[error("invalid window policy '{value}', expected cutoff:N, date:YYYYMMDD, yesterday or all")]
    InvalidPolicy { value: String },
    #[error("invalid granularity '{value}', expected day, week or month")]
    InvalidGranularity { value: String },

    #[error("invalid configuration for '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },
}
