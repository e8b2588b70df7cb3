use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// GET request sent to the quote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Endpoint URL without the query string.
    pub url: String,
    /// Query pairs in the order they are sent.
    pub query: Vec<(String, String)>,
    /// Header names are stored lower-cased.
    pub headers: BTreeMap<String, String>,
    /// Deadline for this single attempt.
    pub timeout: Duration,
}

impl HttpRequest {
    /// GET `url` with no query, no headers and a 30 second deadline.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Append query pairs after any already present.
    pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set a header, replacing an earlier value with the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Override the attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL with the query string appended, as it would appear in server logs.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.url)
    }
}

/// HTTP response returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body, parsed later by the envelope layer.
    pub body: String,
}

impl HttpResponse {
    /// A 200 response carrying `body`.
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// A response with an arbitrary status.
    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// The quote server signals success with a plain 200 only.
    pub const fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Transport failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// No response before the deadline.
    Timeout,
    /// The server could not be reached.
    Connect,
    /// The body could not be read.
    Body,
    /// Anything else reported by the transport.
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
    retryable: bool,
}

impl HttpError {
    /// A retryable error of `kind`.
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Connect, message)
    }

    /// An error no retry can fix, such as a client that failed to build.
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            kind: HttpErrorKind::Other,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Async transport contract.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Builds the connection pool used by one batch.
///
/// The scheduler asks for a fresh client per batch; nothing is reused across
/// batch boundaries unless the factory chooses to hand out a shared client.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, capacity: usize) -> Result<Arc<dyn HttpClient>, HttpError>;
}

/// Production HTTP client using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    /// Client whose idle pool keeps at most `capacity` connections to the host.
    pub fn with_pool_capacity(capacity: usize) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("quotefetch/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(capacity.max(1))
            .build()
            .map_err(|e| HttpError::non_retryable(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .query(&request.query)
                .timeout(request.timeout);

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    HttpError::connect(format!("connection failed: {e}"))
                } else {
                    HttpError::new(HttpErrorKind::Other, format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                HttpError::new(
                    HttpErrorKind::Body,
                    format!("failed to read response body: {e}"),
                )
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

/// Creates one reqwest client per batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestClientFactory;

impl ClientFactory for ReqwestClientFactory {
    fn connect(&self, capacity: usize) -> Result<Arc<dyn HttpClient>, HttpError> {
        Ok(Arc::new(ReqwestHttpClient::with_pool_capacity(capacity)?))
    }
}

/// Hands every batch the same pre-built client.
#[derive(Clone)]
pub struct SharedClientFactory {
    client: Arc<dyn HttpClient>,
}

impl SharedClientFactory {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl ClientFactory for SharedClientFactory {
    fn connect(&self, _capacity: usize) -> Result<Arc<dyn HttpClient>, HttpError> {
        Ok(Arc::clone(&self.client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_keeps_parameter_order_and_encodes_values() {
        let request = HttpRequest::get("http://127.0.0.1:25510/hist/option/quote")
            .with_query([("root", "BRK B"), ("exp", "20230317")]);

        assert_eq!(
            request.full_url(),
            "http://127.0.0.1:25510/hist/option/quote?root=BRK%20B&exp=20230317"
        );
    }

    #[test]
    fn headers_are_lower_cased() {
        let request = HttpRequest::get("http://127.0.0.1:25510/list/roots")
            .with_header("Accept", "application/json");

        assert_eq!(
            request.headers.get("accept").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn only_plain_ok_counts_as_success() {
        assert!(HttpResponse::ok_json("{}").is_success());
        assert!(!HttpResponse::with_status(204, "").is_success());
        assert!(!HttpResponse::with_status(500, "").is_success());
    }

    #[test]
    fn non_retryable_errors_keep_their_message() {
        let error = HttpError::non_retryable("bad url");
        assert!(!error.retryable());
        assert_eq!(error.message(), "bad url");
        assert!(HttpError::timeout("slow").retryable());
    }
}
