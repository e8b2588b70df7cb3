//! Contract construction: identity + operation + window → URL and ordered query.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::domain::{Identity, Operation, QuoteDate, SecurityType};
use crate::envelope::ErrorKind;
use crate::executor::FetchOutcome;
use crate::http_client::HttpRequest;
use crate::ValidationError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 25_510;

/// Where the local quote server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEndpoint {
    host: String,
    port: u16,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
        }
    }
}

impl ServiceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ValidationError> {
        let host = host.into().trim().to_owned();
        if host.is_empty() || host.contains('/') || host.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidConfig {
                key: String::from("host"),
                reason: format!("'{host}' is not a bare host name"),
            });
        }
        if port == 0 {
            return Err(ValidationError::InvalidConfig {
                key: String::from("port"),
                reason: String::from("port must be non-zero"),
            });
        }
        Ok(Self { host, port })
    }

    /// Terminal instances listen on consecutive ports starting at the default.
    pub fn for_config_id(host: impl Into<String>, config_id: u16) -> Result<Self, ValidationError> {
        let port = DEFAULT_PORT
            .checked_add(config_id)
            .ok_or_else(|| ValidationError::InvalidConfig {
                key: String::from("config_id"),
                reason: format!("{config_id} pushes the port past 65535"),
            })?;
        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Query parameters in the order they are sent.
///
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for QueryParams {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Window and extra parameters supplied alongside an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams {
    pub start_date: Option<QuoteDate>,
    pub end_date: Option<QuoteDate>,
    pub ivl_ms: Option<u64>,
    pub extras: Vec<(String, String)>,
}

impl FetchParams {
    pub fn range(start_date: QuoteDate, end_date: QuoteDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Self::default()
        }
    }

    pub fn with_ivl_ms(mut self, ivl_ms: u64) -> Self {
        self.ivl_ms = Some(ivl_ms);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.push((key.into(), value.into()));
        self
    }
}

/// One immutable unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractRequest {
    security: SecurityType,
    identity: Identity,
    operation: Operation,
    url: String,
    params: QueryParams,
}

impl ContractRequest {
    pub const fn security(&self) -> SecurityType {
        self.security
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub const fn operation(&self) -> Operation {
        self.operation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Transport request for one attempt at this contract.
    pub fn to_http(&self, timeout: Duration) -> HttpRequest {
        HttpRequest::get(self.url.as_str())
            .with_query(self.params.as_pairs().iter().cloned())
            .with_header("accept", "application/json")
            .with_timeout(timeout)
    }

    /// Encoded URL that replays this contract by hand.
    pub fn full_url(&self) -> String {
        self.to_http(Duration::ZERO).full_url()
    }
}

impl Display for ContractRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.operation, self.identity)
    }
}

/// Transport diagnostics recorded by the executor regardless of outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub request_id: Option<String>,
    pub latency_ms: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    pub attempts: u32,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

/// Executor output for one contract, joined back to its request by `sequence`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractResult {
    /// Index of the originating request in the scheduled slice.
    pub sequence: usize,
    pub task_id: Uuid,
    pub outcome: FetchOutcome,
    pub diagnostics: Diagnostics,
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Turns identity rows into requests.
pub trait ContractFactory: Send + Sync {
    fn build(
        &self,
        security: SecurityType,
        identity: Identity,
        operation: Operation,
        params: &FetchParams,
    ) -> Result<ContractRequest, ValidationError>;
}

/// Builds requests for the local quote server's REST layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteServerFactory {
    endpoint: ServiceEndpoint,
}

impl QuoteServerFactory {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self { endpoint }
    }

    fn range_params(
        operation: Operation,
        identity: &Identity,
        params: &FetchParams,
        query: &mut QueryParams,
    ) -> Result<(), ValidationError> {
        let missing = |param| ValidationError::MissingParam {
            operation: operation.name(),
            param,
        };
        let start = params.start_date.ok_or_else(|| missing("start_date"))?;
        let end = params.end_date.ok_or_else(|| missing("end_date"))?;
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.to_wire(),
                end: end.to_wire(),
            });
        }
        if let Some(expiry) = identity.expiry {
            if end > expiry {
                return Err(ValidationError::RangeAfterExpiry {
                    end: end.to_wire(),
                    expiry: expiry.to_wire(),
                });
            }
        }
        let ivl = params
            .ivl_ms
            .or_else(|| operation.kind().and_then(|kind| kind.default_interval_ms()))
            .ok_or_else(|| missing("ivl"))?;

        query.insert("start_date", start.to_wire());
        query.insert("end_date", end.to_wire());
        query.insert("root", identity.root.as_str());
        query.insert("ivl", ivl.to_string());
        Ok(())
    }
}

impl ContractFactory for QuoteServerFactory {
    fn build(
        &self,
        security: SecurityType,
        identity: Identity,
        operation: Operation,
        params: &FetchParams,
    ) -> Result<ContractRequest, ValidationError> {
        operation.validate_identity(security, &identity)?;

        let mut query = QueryParams::new();
        match operation {
            Operation::ListRoots => query.insert("sec", security.listing_code()),
            _ if operation.is_ranged() => {
                Self::range_params(operation, &identity, params, &mut query)?;
            }
            _ => query.insert("root", identity.root.as_str()),
        }
        if let Some(expiry) = identity.expiry {
            query.insert("exp", expiry.to_wire());
        }
        if let Some(leg) = identity.leg {
            query.insert("right", leg.right.as_str());
            query.insert("strike", leg.strike.scaled().to_string());
        }
        for (key, value) in &params.extras {
            query.insert(key.clone(), value.clone());
        }

        let url = format!("{}/{}", self.endpoint.base_url(), operation.path(security));
        Ok(ContractRequest {
            security,
            identity,
            operation,
            url,
            params: query,
        })
    }
}
