//! Run configuration assembled from defaults, environment and explicit overrides.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `QUOTEFETCH_HOST` | quote-server host | `127.0.0.1` |
//! | `QUOTEFETCH_PORT` | quote-server port | `25510` |
//! | `QUOTEFETCH_CONFIG_ID` / `CONFIG_ID` | port offset when no port is given | none |
//! | `QUOTEFETCH_BATCH_SIZE` | contracts per batch | `128` |
//! | `QUOTEFETCH_TIMEOUT_SECS` | batch drain budget | `120` |
//! | `QUOTEFETCH_MAX_RETRY` | batch retries per run | `3` |
//! | `QUOTEFETCH_SLEEP_SECS` | base pause before a batch retry | `30` |
//! | `QUOTEFETCH_REQUEST_TIMEOUT_SECS` | per-request timeout | `30` |
//!
//! Explicit `with_*` values win over the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::contract::{ServiceEndpoint, DEFAULT_HOST, DEFAULT_PORT};
use crate::retry::RetryConfig;
use crate::scheduler::BatchConfig;
use crate::ValidationError;

const ENV_HOST: &str = "QUOTEFETCH_HOST";
const ENV_PORT: &str = "QUOTEFETCH_PORT";
const ENV_CONFIG_ID: &str = "QUOTEFETCH_CONFIG_ID";
const ENV_CONFIG_ID_LEGACY: &str = "CONFIG_ID";
const ENV_BATCH_SIZE: &str = "QUOTEFETCH_BATCH_SIZE";
const ENV_TIMEOUT_SECS: &str = "QUOTEFETCH_TIMEOUT_SECS";
const ENV_MAX_RETRY: &str = "QUOTEFETCH_MAX_RETRY";
const ENV_SLEEP_SECS: &str = "QUOTEFETCH_SLEEP_SECS";
const ENV_REQUEST_TIMEOUT_SECS: &str = "QUOTEFETCH_REQUEST_TIMEOUT_SECS";

const ENV_KEYS: [&str; 9] = [
    ENV_HOST,
    ENV_PORT,
    ENV_CONFIG_ID,
    ENV_CONFIG_ID_LEGACY,
    ENV_BATCH_SIZE,
    ENV_TIMEOUT_SECS,
    ENV_MAX_RETRY,
    ENV_SLEEP_SECS,
    ENV_REQUEST_TIMEOUT_SECS,
];

/// Everything a run needs to reach the server and pace itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchConfig {
    /// Where the quote server listens.
    pub endpoint: ServiceEndpoint,
    /// Batch sizing, escalation and the per-request timeout.
    pub batch: BatchConfig,
    /// Per-contract retry inside a batch.
    pub retry: RetryConfig,
}

impl FetchConfig {
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    config_id: Option<u16>,
    batch_size: Option<usize>,
    timeout: Option<Duration>,
    max_batch_retry: Option<u32>,
    sleep_base: Option<Duration>,
    request_timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    env: Vec<(&'static str, String)>,
}

impl FetchConfigBuilder {
    /// Read `QUOTEFETCH_*` variables from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| env::var(key).ok())
    }

    /// Read variables through `lookup`; values are parsed in [`Self::build`].
    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in ENV_KEYS {
            if let Some(value) = lookup(key).filter(|value| !value.trim().is_empty()) {
                self.env.push((key, value));
            }
        }
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_config_id(mut self, config_id: u16) -> Self {
        self.config_id = Some(config_id);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_batch_retry(mut self, retries: u32) -> Self {
        self.max_batch_retry = Some(retries);
        self
    }

    pub fn with_sleep_base(mut self, sleep: Duration) -> Self {
        self.sleep_base = Some(sleep);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<FetchConfig, ValidationError> {
        let defaults = BatchConfig::default();

        let host = match self.host.clone() {
            Some(host) => host,
            None => self
                .env_raw(ENV_HOST)
                .map_or_else(|| String::from(DEFAULT_HOST), str::to_owned),
        };
        let port = match self.port {
            Some(port) => Some(port),
            None => self.env_parse::<u16>(ENV_PORT)?,
        };
        let port = match port {
            Some(port) => port,
            None => match self.config_id()? {
                Some(id) => DEFAULT_PORT.checked_add(id).ok_or_else(|| invalid(
                    ENV_CONFIG_ID,
                    format!("{id} pushes the port past 65535"),
                ))?,
                None => DEFAULT_PORT,
            },
        };
        let endpoint = ServiceEndpoint::new(host, port)?;

        let batch = BatchConfig {
            batch_size: self.resolve(self.batch_size, ENV_BATCH_SIZE, defaults.batch_size)?,
            timeout: self.resolve_secs(self.timeout, ENV_TIMEOUT_SECS, defaults.timeout)?,
            max_batch_retry: self.resolve(
                self.max_batch_retry,
                ENV_MAX_RETRY,
                defaults.max_batch_retry,
            )?,
            sleep_base: self.resolve_secs(self.sleep_base, ENV_SLEEP_SECS, defaults.sleep_base)?,
            request_timeout: self.resolve_secs(
                self.request_timeout,
                ENV_REQUEST_TIMEOUT_SECS,
                defaults.request_timeout,
            )?,
        };
        batch
            .validate()
            .map_err(|error| invalid("batch", error.to_string()))?;

        Ok(FetchConfig {
            endpoint,
            batch,
            retry: self.retry.unwrap_or_default(),
        })
    }

    fn config_id(&self) -> Result<Option<u16>, ValidationError> {
        if self.config_id.is_some() {
            return Ok(self.config_id);
        }
        match self.env_parse(ENV_CONFIG_ID)? {
            Some(id) => Ok(Some(id)),
            None => self.env_parse(ENV_CONFIG_ID_LEGACY),
        }
    }

    fn env_raw(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.trim())
    }

    fn env_parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ValidationError> {
        self.env_raw(key)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| invalid(key, format!("'{raw}' is not a valid number")))
            })
            .transpose()
    }

    fn resolve<T: FromStr>(
        &self,
        explicit: Option<T>,
        key: &str,
        default: T,
    ) -> Result<T, ValidationError> {
        match explicit {
            Some(value) => Ok(value),
            None => Ok(self.env_parse(key)?.unwrap_or(default)),
        }
    }

    fn resolve_secs(
        &self,
        explicit: Option<Duration>,
        key: &str,
        default: Duration,
    ) -> Result<Duration, ValidationError> {
        match explicit {
            Some(value) => Ok(value),
            None => Ok(self
                .env_parse::<u64>(key)?
                .map_or(default, Duration::from_secs)),
        }
    }
}

fn invalid(key: &str, reason: String) -> ValidationError {
    ValidationError::InvalidConfig {
        key: key.to_owned(),
        reason,
    }
}
