//! # Quotefetch Core
//!
//! Batch fetch orchestration for a local options quote server.
//!
//! ## Overview
//!
//! This crate turns option identities into validated HTTP contracts, executes
//! them in bounded concurrent batches, and folds the responses back into
//! tables:
//!
//! - **Contracts** pairing an identity with a server operation and query
//! - **Envelope parsing** of the server's `{header, response}` JSON shape
//! - **Fetch execution** with per-request retry and diagnostics
//! - **Batch scheduling** with escalating timeout and pause on batch timeouts
//! - **Date windows** derived from discovered available dates
//! - **Result assembly** joining records back to their request parameters
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`assembler`] | Joins results to requests into one table |
//! | [`config`] | Defaults, environment and explicit overrides |
//! | [`contract`] | Request construction and result types |
//! | [`domain`] | Roots, dates, strikes, identities, operations |
//! | [`envelope`] | Response envelope parsing and record decoding |
//! | [`error`] | Validation errors |
//! | [`executor`] | Single-contract fetch with retry |
//! | [`http_client`] | HTTP client abstraction |
//! | [`job`] | List → discover → window → fetch for one root |
//! | [`retry`] | Backoff and retry policy |
//! | [`scheduler`] | Bounded batches with escalating batch retry |
//! | [`windows`] | Date-window policies and grouping |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / JobRunner│
//! └────────┬────────┘
//!          │ identities
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ ContractFactory │────▶│ ContractRequest  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ BatchScheduler  │────▶│ FetchExecutor    │
//! │ (escalation)    │     │ (HttpClient)     │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       ▼
//!          │              ┌──────────────────┐
//!          │              │ envelope::parse  │
//!          ▼              └──────────────────┘
//! ┌─────────────────┐
//! │ ResultAssembler │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Per-contract problems never abort a batch. They surface as
//! [`FetchOutcome::Failed`] with a [`FetchErrorKind`]:
//!
//! ```rust
//! use quotefetch_core::{FetchErrorKind, FetchOutcome};
//!
//! fn describe(outcome: &FetchOutcome) -> &'static str {
//!     match outcome {
//!         FetchOutcome::Success(_) => "rows",
//!         FetchOutcome::NoData => "empty",
//!         FetchOutcome::Failed(error) => match error.kind() {
//!             FetchErrorKind::RootOrExpirationInvalid => "bad expiration",
//!             _ => "failed",
//!         },
//!     }
//! }
//! ```
//!
//! Only exhausting the batch retry budget fails a whole run
//! ([`SchedulerError::MaxRetriesExceeded`]).

pub mod assembler;
pub mod config;
pub mod contract;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod http_client;
pub mod job;
pub mod retry;
pub mod scheduler;
pub mod windows;

pub use assembler::{AssembledTable, FailedContract, ResultAssembler, Table};

pub use config::{FetchConfig, FetchConfigBuilder};

pub use contract::{
    ContractFactory, ContractRequest, ContractResult, Diagnostics, FetchParams, QueryParams,
    QuoteServerFactory, ServiceEndpoint, DEFAULT_HOST, DEFAULT_PORT,
};

pub use domain::{
    CallType, DataKind, Identity, Operation, OptionLeg, QuoteDate, Right, Root, STRIKE_SCALE,
    SecurityType, Strike,
};

pub use envelope::{EnvelopeError, ErrorKind, Record, ResponseEnvelope};

pub use error::ValidationError;

pub use executor::{FetchError, FetchErrorKind, FetchExecutor, FetchOutcome};

pub use http_client::{
    ClientFactory, HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpRequest, HttpResponse,
    ReqwestClientFactory, ReqwestHttpClient, SharedClientFactory,
};

pub use job::{
    ExpiryFailure, ExpiryFrequency, ExpiryTable, JobError, JobReport, JobRunner, JobSpec,
    SkipReason, SkippedExpiry, WindowPlan,
};

pub use retry::{Backoff, RetryConfig};

pub use scheduler::{BatchConfig, BatchScheduler, Escalation, SchedulerError};

pub use windows::{
    DateWindow, DiscoveryRow, Granularity, WindowBuilder, WindowError, WindowPolicy,
};
