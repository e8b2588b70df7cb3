use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::contract::{ContractRequest, ContractResult, Diagnostics};
use crate::envelope::{self, EnvelopeError, Record};
use crate::http_client::{HttpClient, HttpError, HttpResponse};
use crate::retry::RetryConfig;

/// Failure category for a single contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Transport,
    HttpStatus,
    RootOrExpirationInvalid,
    EmptyResponse,
    OtherFormat,
    Aborted,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::HttpStatus => "http_status",
            Self::RootOrExpirationInvalid => "root_or_expiration_invalid",
            Self::EmptyResponse => "empty_response",
            Self::OtherFormat => "other_format",
            Self::Aborted => "aborted",
        }
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured per-contract failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
}

impl FetchError {
    pub fn transport(error: &HttpError) -> Self {
        Self {
            kind: FetchErrorKind::Transport,
            message: error.message().to_owned(),
            retryable: error.retryable(),
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Aborted,
            message: message.into(),
            retryable: false,
        }
    }

    fn from_envelope(error: EnvelopeError) -> Self {
        let kind = match &error {
            EnvelopeError::Transport { .. } => FetchErrorKind::HttpStatus,
            EnvelopeError::RootOrExpirationInvalid { .. } => FetchErrorKind::RootOrExpirationInvalid,
            EnvelopeError::EmptyResponse => FetchErrorKind::EmptyResponse,
            _ => FetchErrorKind::OtherFormat,
        };
        // Envelope-level failures do not self-heal.
        Self {
            kind,
            message: error.to_string(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

impl Serialize for FetchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("FetchError", 3)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("retryable", &self.retryable)?;
        state.end()
    }
}

/// Result of executing one contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success(Vec<Record>),
    NoData,
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Success(records) => records,
            Self::NoData | Self::Failed(_) => &[],
        }
    }

    pub const fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Success(_) | Self::NoData => None,
        }
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Runs one contract against the quote server with task-level retry.
#[derive(Debug, Clone, Default)]
pub struct FetchExecutor {
    retry: RetryConfig,
}

impl FetchExecutor {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    /// Fetch and decode `request`. Never panics or errors; every failure mode is
    /// folded into the returned outcome.
    pub async fn execute(
        &self,
        sequence: usize,
        request: &ContractRequest,
        client: &dyn HttpClient,
        timeout: Duration,
    ) -> ContractResult {
        let task_id = Uuid::new_v4();
        let started = Instant::now();
        let mut diagnostics = Diagnostics::default();
        let attempt_limit = self.retry.attempt_limit();

        let outcome = loop {
            diagnostics.attempts += 1;
            let attempt = diagnostics.attempts;
            let response = send(request, client, timeout).await;

            let retry = match &response {
                Ok(response) => {
                    !response.is_success() && self.retry.should_retry_status(response.status)
                }
                Err(error) => self.retry.should_retry_transport(error),
            };
            if retry && attempt < attempt_limit {
                let delay = self.retry.delay_for_attempt(attempt - 1);
                warn!(
                    %task_id,
                    contract = %request,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying contract"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            break match response {
                Ok(response) => interpret(request, &response, &mut diagnostics),
                Err(error) => FetchOutcome::Failed(FetchError::transport(&error)),
            };
        };

        diagnostics.elapsed = started.elapsed();
        match &outcome {
            FetchOutcome::Success(records) => debug!(
                %task_id,
                contract = %request,
                rows = records.len(),
                attempts = diagnostics.attempts,
                "contract fetched"
            ),
            FetchOutcome::NoData => debug!(%task_id, contract = %request, "no data for contract"),
            FetchOutcome::Failed(error) => warn!(
                %task_id,
                contract = %request,
                url = %request.full_url(),
                kind = %error.kind(),
                attempts = diagnostics.attempts,
                "contract failed: {}",
                error.message()
            ),
        }

        ContractResult {
            sequence,
            task_id,
            outcome,
            diagnostics,
        }
    }
}

async fn send(
    request: &ContractRequest,
    client: &dyn HttpClient,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    match tokio::time::timeout(timeout, client.execute(request.to_http(timeout))).await {
        Ok(result) => result,
        Err(_) => Err(HttpError::timeout(format!(
            "no response within {} ms",
            timeout.as_millis()
        ))),
    }
}

fn interpret(
    request: &ContractRequest,
    response: &HttpResponse,
    diagnostics: &mut Diagnostics,
) -> FetchOutcome {
    let parsed = match envelope::parse(response) {
        Ok(parsed) => parsed,
        Err(error) => return FetchOutcome::Failed(FetchError::from_envelope(error)),
    };
    diagnostics.request_id = parsed.request_id.clone();
    diagnostics.latency_ms = parsed.latency_ms;
    diagnostics.error_kind = Some(parsed.error_kind);

    match envelope::decode(&parsed, request.operation()) {
        Ok(records) => FetchOutcome::Success(records),
        Err(EnvelopeError::NoData { .. }) => FetchOutcome::NoData,
        Err(error) => FetchOutcome::Failed(FetchError::from_envelope(error)),
    }
}
