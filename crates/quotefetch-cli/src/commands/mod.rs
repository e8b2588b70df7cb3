mod expirations;
mod fetch;
mod get;
mod strikes;
mod windows;

use std::sync::Arc;
use std::time::Duration;

use quotefetch_core::{
    BatchScheduler, ClientFactory, DataKind, ExpiryFrequency, FetchConfig, FetchExecutor,
    Granularity, JobRunner, JobSpec, Operation, QuoteDate, QuoteServerFactory, ReqwestClientFactory,
    Right, Root, ValidationError, WindowPolicy,
};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command, ExpiryRangeArgs, WindowArgs};
use crate::error::CliError;

/// Result of one command, ready for rendering.
#[derive(Debug)]
pub struct CommandOutput {
    pub data: Value,
    /// Flat rows for line-oriented output, when the command produced a table.
    pub rows: Option<Value>,
    /// Contracts or expirations that did not resolve.
    pub failures: usize,
}

impl CommandOutput {
    pub fn data(data: Value) -> Self {
        Self {
            data,
            rows: None,
            failures: 0,
        }
    }
}

/// Shared wiring for every command.
pub struct Context {
    pub factory: QuoteServerFactory,
    pub scheduler: BatchScheduler,
    pub runner: JobRunner,
}

impl Context {
    fn new(config: FetchConfig, clients: Arc<dyn ClientFactory>) -> Result<Self, CliError> {
        let factory = QuoteServerFactory::new(config.endpoint.clone());
        let scheduler = BatchScheduler::new(
            config.batch.clone(),
            FetchExecutor::new(config.retry.clone()),
            Arc::clone(&clients),
        )?;
        let runner = JobRunner::from_config(&config, clients)?;
        Ok(Self {
            factory,
            scheduler,
            runner,
        })
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let config = build_config(cli)?;
    debug!(
        endpoint = %config.endpoint.base_url(),
        batch_size = config.batch.batch_size,
        "configuration resolved"
    );
    let context = Context::new(config, Arc::new(ReqwestClientFactory))?;

    match &cli.command {
        Command::Expirations(args) => expirations::run(args, &context).await,
        Command::Strikes(args) => strikes::run(args, &context).await,
        Command::Get(args) => get::run(args, &context).await,
        Command::Windows(args) => windows::run(args, &context).await,
        Command::Fetch(args) => fetch::run(args, &context).await,
    }
}

fn build_config(cli: &Cli) -> Result<FetchConfig, CliError> {
    let mut builder = FetchConfig::builder().with_env();
    if let Some(host) = &cli.host {
        builder = builder.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        builder = builder.with_port(port);
    }
    if let Some(config_id) = cli.config_id {
        builder = builder.with_config_id(config_id);
    }
    if let Some(batch_size) = cli.batch_size {
        builder = builder.with_batch_size(batch_size);
    }
    if let Some(secs) = cli.timeout_secs {
        builder = builder.with_timeout(Duration::from_secs(secs));
    }
    if let Some(retries) = cli.max_retry {
        builder = builder.with_max_batch_retry(retries);
    }
    if let Some(secs) = cli.sleep_secs {
        builder = builder.with_sleep_base(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.request_timeout_secs {
        builder = builder.with_request_timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

fn parse_optional_date(raw: Option<&str>) -> Result<Option<QuoteDate>, ValidationError> {
    raw.map(QuoteDate::parse).transpose()
}

/// Split repeated `key=value` arguments.
fn parse_params(raw: &[String]) -> Result<Vec<(String, String)>, CliError> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_owned(), value.trim().to_owned()))
            }
            _ => Err(CliError::Command(format!(
                "parameter '{pair}' must look like key=value"
            ))),
        })
        .collect()
}

/// Build a job spec from the shared range and window arguments.
fn job_spec(
    root: &str,
    operation: Operation,
    range: Option<&ExpiryRangeArgs>,
    window: &WindowArgs,
) -> Result<JobSpec, CliError> {
    let mut spec = JobSpec::new(Root::parse(root)?, operation);
    spec.discovery = DataKind::parse(&window.discovery)?;
    spec.strike_multiple = window.strike_multiple;
    spec.rights = window
        .rights
        .iter()
        .map(|raw| Right::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;
    spec.rights.sort_unstable();
    spec.rights.dedup();
    spec.policy = window.policy.parse::<WindowPolicy>()?;
    spec.granularity = window.granularity.parse::<Granularity>()?;
    spec.extras = parse_params(&window.params)?;

    if let Some(range) = range {
        spec.min_expiry = parse_optional_date(range.min_exp.as_deref())?;
        spec.max_expiry = parse_optional_date(range.max_exp.as_deref())?;
        spec.frequency = range.frequency.parse::<ExpiryFrequency>()?;
    }
    Ok(spec)
}

fn runner_for(context: &Context, window: &WindowArgs) -> Result<JobRunner, CliError> {
    Ok(match parse_optional_date(window.today.as_deref())? {
        Some(today) => context.runner.clone().with_today(today),
        None => context.runner.clone(),
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn window_args(cli: &Cli) -> (&str, &ExpiryRangeArgs, &WindowArgs) {
        match &cli.command {
            Command::Fetch(args) => (args.root.as_str(), &args.range, &args.window),
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn job_spec_reads_every_window_option() {
        let cli = Cli::try_parse_from([
            "quotefetch",
            "fetch",
            "aapl",
            "--policy",
            "cutoff:3",
            "--granularity",
            "week",
            "--rights",
            "put,P",
            "--frequency",
            "monthly",
            "--min-exp",
            "20230101",
            "--param",
            "ms_of_day=34200000",
        ])
        .expect("arguments");
        let (root, range, window) = window_args(&cli);

        let spec = job_spec(root, Operation::Hist(DataKind::Eod), Some(range), window)
            .expect("spec");

        assert_eq!(spec.root.as_str(), "AAPL");
        assert_eq!(spec.policy, WindowPolicy::CutoffBeforeExpiry(3));
        assert_eq!(spec.granularity, Granularity::Week);
        assert_eq!(spec.rights, [Right::Put]);
        assert_eq!(spec.frequency, ExpiryFrequency::Monthly);
        assert_eq!(spec.min_expiry, Some(QuoteDate::parse("20230101").expect("date")));
        assert_eq!(
            spec.extras,
            [(String::from("ms_of_day"), String::from("34200000"))]
        );
    }

    #[test]
    fn malformed_params_are_rejected() {
        assert!(parse_params(&[String::from("novalue")]).is_err());
        assert!(parse_params(&[String::from("=x")]).is_err());
        assert_eq!(
            parse_params(&[String::from("a=")]).expect("empty value"),
            [(String::from("a"), String::new())]
        );
    }

    #[test]
    fn cli_flags_override_configuration() {
        let cli = Cli::try_parse_from([
            "quotefetch",
            "--port",
            "26001",
            "--batch-size",
            "16",
            "--sleep-secs",
            "2",
            "expirations",
            "SPY",
        ])
        .expect("arguments");

        let config = build_config(&cli).expect("config");
        assert_eq!(config.endpoint.port(), 26001);
        assert_eq!(config.batch.batch_size, 16);
        assert_eq!(config.batch.sleep_base, Duration::from_secs(2));
    }
}
