//! End-to-end acquisition job for one option root.
//!
//! ```text
//! list_expirations ─▶ select by range/frequency
//!        │
//!        ▼ per expiry
//! list_strikes ─▶ strike multiple filter
//!        │
//!        ▼
//! list_dates (strike × right) ─▶ WindowBuilder ─▶ target contracts ─▶ ResultAssembler
//! ```
//!
//! Per-expiry problems (no strikes, every date filtered, nonexistent
//! expiration) are recorded on the report and the job moves on. Exhausting the
//! batch retry budget aborts the job.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::assembler::{AssembledTable, FailedContract, ResultAssembler};
use crate::config::FetchConfig;
use crate::contract::{ContractFactory, ContractRequest, FetchParams, QuoteServerFactory};
use crate::domain::{
    DataKind, Identity, Operation, OptionLeg, QuoteDate, Right, Root, SecurityType, Strike,
};
use crate::executor::{FetchErrorKind, FetchExecutor, FetchOutcome};
use crate::http_client::ClientFactory;
use crate::scheduler::{BatchScheduler, SchedulerError};
use crate::windows::{
    unfiltered_dump, DateWindow, DiscoveryRow, Granularity, WindowBuilder, WindowError,
    WindowPolicy,
};
use crate::ValidationError;

/// Which listed expirations a job keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryFrequency {
    #[default]
    All,
    /// Third-Friday monthly expirations only.
    Monthly,
}

impl FromStr for ExpiryFrequency {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "monthly" => Ok(Self::Monthly),
            _ => Err(ValidationError::InvalidConfig {
                key: String::from("frequency"),
                reason: format!("'{input}' is not one of all, monthly"),
            }),
        }
    }
}

/// What to fetch for one root.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub root: Root,
    pub operation: Operation,
    pub discovery: DataKind,
    pub min_expiry: Option<QuoteDate>,
    pub max_expiry: Option<QuoteDate>,
    pub frequency: ExpiryFrequency,
    /// Keep strikes on this whole-dollar step.
    pub strike_multiple: Option<u32>,
    pub rights: Vec<Right>,
    pub policy: WindowPolicy,
    pub granularity: Granularity,
    pub ivl_ms: Option<u64>,
    pub extras: Vec<(String, String)>,
}

impl JobSpec {
    pub fn new(root: Root, operation: Operation) -> Self {
        Self {
            root,
            operation,
            discovery: DataKind::ImpliedVolatility,
            min_expiry: None,
            max_expiry: None,
            frequency: ExpiryFrequency::All,
            strike_multiple: None,
            rights: Right::ALL.to_vec(),
            policy: WindowPolicy::AllAvailable,
            granularity: Granularity::Day,
            ivl_ms: None,
            extras: Vec::new(),
        }
    }

    /// Reject a spec the target contracts could never be built from, before
    /// anything is listed or discovered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.operation.is_ranged() {
            return Ok(());
        }
        let has_interval = self.ivl_ms.is_some()
            || self
                .operation
                .kind()
                .and_then(DataKind::default_interval_ms)
                .is_some();
        if has_interval {
            Ok(())
        } else {
            Err(ValidationError::MissingParam {
                operation: self.operation.name(),
                param: "ivl",
            })
        }
    }

    fn window_builder(&self, today: QuoteDate) -> WindowBuilder {
        WindowBuilder::new(self.policy, self.granularity)
            .with_today(today)
            .with_extras(self.extras.iter().cloned())
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("{contract}: {message}")]
    RootOrExpirationInvalid { contract: String, message: String },
    #[error("{contract} failed ({kind}) at {url}: {message}")]
    ContractFailed {
        contract: String,
        url: String,
        kind: FetchErrorKind,
        message: String,
    },
    #[error("{count} contracts or expirations did not resolve")]
    UnresolvedFailures { count: usize },
}

/// Discovery result and the windows derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowPlan {
    pub expiry: QuoteDate,
    pub windows: Vec<DateWindow>,
    /// Every discovered row, kept so a fully filtered expiry can be dumped.
    #[serde(skip)]
    pub discovered: Vec<DiscoveryRow>,
    /// Set when the policy removed every discovered date.
    pub filtered_out: bool,
    pub failures: Vec<FailedContract>,
}

impl WindowPlan {
    pub fn unfiltered_dump(&self) -> Vec<Value> {
        unfiltered_dump(&self.discovered)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiryTable {
    pub expiry: QuoteDate,
    pub windows: usize,
    #[serde(flatten)]
    pub assembled: AssembledTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NoStrikes,
    AllDatesFiltered { rows: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedExpiry {
    pub expiry: QuoteDate,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryFailure {
    pub expiry: QuoteDate,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub root: Root,
    pub operation: Operation,
    pub tables: Vec<ExpiryTable>,
    pub skipped: Vec<SkippedExpiry>,
    pub failed_expiries: Vec<ExpiryFailure>,
    /// Discovery-pass failures for expiries that were skipped.
    pub discovery_failures: Vec<FailedContract>,
}

impl JobReport {
    fn new(spec: &JobSpec) -> Self {
        Self {
            root: spec.root.clone(),
            operation: spec.operation,
            tables: Vec::new(),
            skipped: Vec::new(),
            failed_expiries: Vec::new(),
            discovery_failures: Vec::new(),
        }
    }

    /// All expiry tables concatenated.
    pub fn combined(&self) -> AssembledTable {
        let mut combined = AssembledTable::default();
        for table in &self.tables {
            combined.merge(table.assembled.clone());
        }
        combined.failures.extend(self.discovery_failures.iter().cloned());
        combined
    }

    pub fn failure_count(&self) -> usize {
        self.tables
            .iter()
            .map(|table| table.assembled.failures.len())
            .sum::<usize>()
            + self.discovery_failures.len()
            + self.failed_expiries.len()
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|table| table.assembled.table.len()).sum()
    }

    /// Reject the report if anything failed beyond benign no-data.
    pub fn strict(self) -> Result<Self, JobError> {
        match self.failure_count() {
            0 => Ok(self),
            count => Err(JobError::UnresolvedFailures { count }),
        }
    }
}

enum ExpiryRun {
    Fetched(ExpiryTable),
    Skipped(SkippedExpiry, Vec<FailedContract>),
}

/// Drives list → discovery → windows → fetch for a [`JobSpec`].
#[derive(Clone)]
pub struct JobRunner {
    factory: Arc<dyn ContractFactory>,
    scheduler: BatchScheduler,
    today: QuoteDate,
}

impl JobRunner {
    pub fn new(factory: Arc<dyn ContractFactory>, scheduler: BatchScheduler) -> Self {
        Self {
            factory,
            scheduler,
            today: QuoteDate::today_utc(),
        }
    }

    pub fn from_config(
        config: &FetchConfig,
        clients: Arc<dyn ClientFactory>,
    ) -> Result<Self, JobError> {
        let scheduler = BatchScheduler::new(
            config.batch.clone(),
            FetchExecutor::new(config.retry.clone()),
            clients,
        )?;
        Ok(Self::new(
            Arc::new(QuoteServerFactory::new(config.endpoint.clone())),
            scheduler,
        ))
    }

    /// Reference date for the `yesterday` window policy.
    pub fn with_today(mut self, today: QuoteDate) -> Self {
        self.today = today;
        self
    }

    pub async fn list_expirations(&self, root: &Root) -> Result<Vec<QuoteDate>, JobError> {
        let identity = Identity::root(root.clone());
        let records = self.list(identity, Operation::ListExpirations).await?;
        let mut expirations = records
            .iter()
            .filter_map(|record| record.get(Operation::ListExpirations.record_key()))
            .map(QuoteDate::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        expirations.sort_unstable();
        expirations.dedup();
        Ok(expirations)
    }

    pub async fn list_strikes(
        &self,
        root: &Root,
        expiry: QuoteDate,
    ) -> Result<Vec<Strike>, JobError> {
        let identity = Identity::expiration(root.clone(), expiry);
        let records = self.list(identity, Operation::ListStrikes).await?;
        let mut strikes = records
            .iter()
            .filter_map(|record| record.get(Operation::ListStrikes.record_key()))
            .map(strike_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        strikes.sort_unstable();
        strikes.dedup();
        Ok(strikes)
    }

    /// Discover available dates for every strike × right and fold them into windows.
    pub async fn plan_windows(
        &self,
        spec: &JobSpec,
        expiry: QuoteDate,
        strikes: &[Strike],
    ) -> Result<WindowPlan, JobError> {
        let operation = Operation::ListDates(spec.discovery);
        let requests = strikes
            .iter()
            .flat_map(|strike| {
                spec.rights.iter().map(move |right| {
                    Identity::series(
                        spec.root.clone(),
                        expiry,
                        OptionLeg::new(*strike, *right),
                    )
                })
            })
            .map(|identity| {
                self.factory.build(
                    SecurityType::Option,
                    identity,
                    operation,
                    &FetchParams::default(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let results = self.scheduler.run(&requests).await?;

        let mut discovered = Vec::new();
        let mut unreadable = Vec::new();
        for result in &results {
            let (FetchOutcome::Success(records), Some(request)) =
                (&result.outcome, requests.get(result.sequence))
            else {
                continue;
            };
            match DiscoveryRow::from_records(request, records) {
                Ok(rows) => discovered.extend(rows),
                Err(error) => {
                    warn!(
                        contract = %request,
                        url = request.url(),
                        %error,
                        "unreadable discovery rows"
                    );
                    unreadable.push(FailedContract {
                        task_id: result.task_id,
                        contract: request.to_string(),
                        url: request.url().to_owned(),
                        params: request.params().clone(),
                        full_url: request.full_url(),
                        kind: FetchErrorKind::OtherFormat,
                        message: error.to_string(),
                    });
                }
            }
        }
        let mut failures = ResultAssembler::assemble(&requests, &results).failures;
        failures.extend(unreadable);

        let (windows, filtered_out) = match spec
            .window_builder(self.today)
            .build_windows(&discovered)
        {
            Ok(windows) => (windows, false),
            Err(WindowError::AllDatesFiltered { unfiltered }) => {
                warn!(
                    root = %spec.root,
                    %expiry,
                    policy = %spec.policy,
                    rows = unfiltered.len(),
                    "all discovered dates filtered out"
                );
                (Vec::new(), true)
            }
            Err(error) => return Err(error.into()),
        };

        info!(
            root = %spec.root,
            %expiry,
            contracts = requests.len(),
            discovered = discovered.len(),
            windows = windows.len(),
            "planned windows"
        );

        Ok(WindowPlan {
            expiry,
            windows,
            discovered,
            filtered_out,
            failures,
        })
    }

    pub async fn run(&self, spec: &JobSpec) -> Result<JobReport, JobError> {
        spec.validate()?;
        let listed = self.list_expirations(&spec.root).await?;
        let expirations = select_expirations(
            &listed,
            spec.min_expiry,
            spec.max_expiry,
            spec.frequency,
        );
        info!(
            root = %spec.root,
            operation = %spec.operation,
            listed = listed.len(),
            selected = expirations.len(),
            "selected expirations"
        );

        let mut report = JobReport::new(spec);
        for expiry in expirations {
            match self.run_expiry(spec, expiry).await {
                Ok(ExpiryRun::Fetched(table)) => report.tables.push(table),
                Ok(ExpiryRun::Skipped(skipped, failures)) => {
                    report.skipped.push(skipped);
                    report.discovery_failures.extend(failures);
                }
                Err(JobError::RootOrExpirationInvalid { contract, message }) => {
                    warn!(%contract, %message, "expiration rejected by the server");
                    report.failed_expiries.push(ExpiryFailure { expiry, message });
                }
                Err(error) => return Err(error),
            }
        }

        info!(
            root = %spec.root,
            expiries = report.tables.len(),
            skipped = report.skipped.len(),
            rows = report.row_count(),
            failures = report.failure_count(),
            "job finished"
        );
        Ok(report)
    }

    async fn run_expiry(&self, spec: &JobSpec, expiry: QuoteDate) -> Result<ExpiryRun, JobError> {
        let strikes = select_strikes(
            &self.list_strikes(&spec.root, expiry).await?,
            spec.strike_multiple,
        );
        if strikes.is_empty() {
            warn!(root = %spec.root, %expiry, "no strikes selected");
            return Ok(ExpiryRun::Skipped(
                SkippedExpiry {
                    expiry,
                    reason: SkipReason::NoStrikes,
                },
                Vec::new(),
            ));
        }

        let plan = self.plan_windows(spec, expiry, &strikes).await?;
        if plan.filtered_out {
            return Ok(ExpiryRun::Skipped(
                SkippedExpiry {
                    expiry,
                    reason: SkipReason::AllDatesFiltered {
                        rows: plan.discovered.len(),
                    },
                },
                plan.failures,
            ));
        }

        let requests = self.target_requests(spec, &plan.windows)?;
        let results = self.scheduler.run(&requests).await?;
        let mut assembled = ResultAssembler::assemble(&requests, &results);
        assembled.failures.extend(plan.failures);

        info!(
            root = %spec.root,
            %expiry,
            rows = assembled.table.len(),
            no_data = assembled.no_data,
            failures = assembled.failures.len(),
            "expiry fetched"
        );
        Ok(ExpiryRun::Fetched(ExpiryTable {
            expiry,
            windows: plan.windows.len(),
            assembled,
        }))
    }

    /// One request per window. Bulk operations address the whole expiration,
    /// so series windows sharing a bucket fold into one span.
    fn target_requests(
        &self,
        spec: &JobSpec,
        windows: &[DateWindow],
    ) -> Result<Vec<ContractRequest>, JobError> {
        let folded;
        let windows = if spec.operation.is_bulk() {
            folded = fold_bulk_windows(windows, spec.granularity);
            folded.as_slice()
        } else {
            windows
        };

        windows
            .iter()
            .map(|window| {
                let mut params = window.fetch_params();
                params.ivl_ms = spec.ivl_ms;
                self.factory
                    .build(
                        SecurityType::Option,
                        window.identity.clone(),
                        spec.operation,
                        &params,
                    )
                    .map_err(JobError::from)
            })
            .collect()
    }

    async fn list(
        &self,
        identity: Identity,
        operation: Operation,
    ) -> Result<Vec<crate::envelope::Record>, JobError> {
        let request = self.factory.build(
            SecurityType::Option,
            identity,
            operation,
            &FetchParams::default(),
        )?;
        let results = self.scheduler.run(std::slice::from_ref(&request)).await?;
        let Some(result) = results.into_iter().next() else {
            return Ok(Vec::new());
        };

        match result.outcome {
            FetchOutcome::Success(records) => Ok(records),
            FetchOutcome::NoData => Ok(Vec::new()),
            FetchOutcome::Failed(error) if error.kind() == FetchErrorKind::RootOrExpirationInvalid => {
                Err(JobError::RootOrExpirationInvalid {
                    contract: request.to_string(),
                    message: error.message().to_owned(),
                })
            }
            FetchOutcome::Failed(error) => Err(JobError::ContractFailed {
                contract: request.to_string(),
                url: request.full_url(),
                kind: error.kind(),
                message: error.message().to_owned(),
            }),
        }
    }
}

/// Expirations inside `[min, max]` matching `frequency`, in ascending order.
pub fn select_expirations(
    expirations: &[QuoteDate],
    min: Option<QuoteDate>,
    max: Option<QuoteDate>,
    frequency: ExpiryFrequency,
) -> Vec<QuoteDate> {
    expirations
        .iter()
        .copied()
        .filter(|expiry| min.map_or(true, |min| *expiry >= min))
        .filter(|expiry| max.map_or(true, |max| *expiry <= max))
        .filter(|expiry| match frequency {
            ExpiryFrequency::All => true,
            ExpiryFrequency::Monthly => expiry.is_third_friday(),
        })
        .collect()
}

/// Merge per-series windows into one expiration-level window per bucket,
/// spanning the earliest start to the latest end.
fn fold_bulk_windows(windows: &[DateWindow], granularity: Granularity) -> Vec<DateWindow> {
    let mut folded: BTreeMap<(Identity, QuoteDate), DateWindow> = BTreeMap::new();
    for window in windows {
        let identity = match window.identity.expiry {
            Some(expiry) => Identity::expiration(window.identity.root.clone(), expiry),
            None => window.identity.clone(),
        };
        folded
            .entry((identity.clone(), granularity.bucket(window.start_date)))
            .and_modify(|merged| {
                merged.start_date = merged.start_date.min(window.start_date);
                merged.end_date = merged.end_date.max(window.end_date);
            })
            .or_insert_with(|| DateWindow {
                identity,
                ..window.clone()
            });
    }
    folded.into_values().collect()
}

pub fn select_strikes(strikes: &[Strike], multiple: Option<u32>) -> Vec<Strike> {
    strikes
        .iter()
        .copied()
        .filter(|strike| multiple.map_or(true, |step| strike.is_multiple_of(step)))
        .collect()
}

fn strike_from_json(value: &Value) -> Result<Strike, ValidationError> {
    match value.as_i64() {
        Some(scaled) => Strike::from_scaled(scaled),
        None => Err(ValidationError::InvalidStrike {
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> QuoteDate {
        QuoteDate::parse(raw).expect("date")
    }

    #[test]
    fn monthly_selection_keeps_third_fridays_in_range() {
        let listed = [
            date("20230310"),
            date("20230317"),
            date("20230421"),
            date("20230519"),
            date("20230616"),
        ];

        let selected = select_expirations(
            &listed,
            Some(date("20230315")),
            Some(date("20230531")),
            ExpiryFrequency::Monthly,
        );
        assert_eq!(selected, [date("20230317"), date("20230421"), date("20230519")]);

        let all = select_expirations(&listed, None, Some(date("20230317")), ExpiryFrequency::All);
        assert_eq!(all, [date("20230310"), date("20230317")]);
    }

    #[test]
    fn strike_multiple_filters_in_scaled_units() {
        let strikes: Vec<Strike> = [145_000, 147_500, 150_000, 152_500, 155_000]
            .into_iter()
            .map(|scaled| Strike::from_scaled(scaled).expect("strike"))
            .collect();

        let kept = select_strikes(&strikes, Some(5));
        assert_eq!(
            kept.iter().map(|s| s.scaled()).collect::<Vec<_>>(),
            [145_000, 150_000, 155_000]
        );
        assert_eq!(select_strikes(&strikes, None).len(), 5);
    }

    #[test]
    fn frequency_parses_from_cli_values() {
        assert_eq!(
            "Monthly".parse::<ExpiryFrequency>().expect("monthly"),
            ExpiryFrequency::Monthly
        );
        assert!("weekly".parse::<ExpiryFrequency>().is_err());
    }

    #[test]
    fn strict_report_rejects_unresolved_failures() {
        let spec = JobSpec::new(
            Root::parse("AAPL").expect("root"),
            Operation::Hist(DataKind::Eod),
        );
        let mut report = JobReport::new(&spec);
        assert!(report.clone().strict().is_ok());

        report.failed_expiries.push(ExpiryFailure {
            expiry: date("20230317"),
            message: String::from("Nonexistent root symbol or expiration"),
        });
        assert!(matches!(
            report.strict(),
            Err(JobError::UnresolvedFailures { count: 1 })
        ));
    }

    #[test]
    fn intraday_jobs_need_an_interval_up_front() {
        let root = Root::parse("AAPL").expect("root");
        let quotes = JobSpec::new(root.clone(), Operation::Hist(DataKind::Quote));
        assert!(matches!(
            quotes.validate(),
            Err(ValidationError::MissingParam { param: "ivl", .. })
        ));

        let with_interval = JobSpec {
            ivl_ms: Some(60_000),
            ..quotes
        };
        assert!(with_interval.validate().is_ok());
        assert!(JobSpec::new(root, Operation::BulkHist(DataKind::Eod))
            .validate()
            .is_ok());
    }

    #[test]
    fn bulk_windows_fold_to_one_span_per_bucket() {
        let root = Root::parse("AAPL").expect("root");
        let expiry = date("20230317");
        let series = |scaled, start: &str, end: &str| DateWindow {
            identity: Identity::series(
                root.clone(),
                expiry,
                OptionLeg::new(Strike::from_scaled(scaled).expect("strike"), Right::Call),
            ),
            start_date: date(start),
            end_date: date(end),
            extras: Vec::new(),
        };

        let folded = fold_bulk_windows(
            &[
                series(145_000, "20230301", "20230302"),
                series(150_000, "20230301", "20230303"),
                series(150_000, "20230306", "20230310"),
            ],
            Granularity::Week,
        );

        let spans: Vec<_> = folded
            .iter()
            .map(|window| (window.start_date, window.end_date))
            .collect();
        assert_eq!(
            spans,
            [
                (date("20230301"), date("20230303")),
                (date("20230306"), date("20230310"))
            ]
        );
        assert!(folded.iter().all(|window| window.identity.leg.is_none()));
    }

    #[test]
    fn strikes_read_from_scaled_integers() {
        assert_eq!(
            strike_from_json(&serde_json::json!(152500)).expect("strike").dollars(),
            152.5
        );
        assert!(strike_from_json(&serde_json::json!("152.5")).is_err());
    }
}
