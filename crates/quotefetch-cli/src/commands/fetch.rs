use quotefetch_core::Operation;
use tracing::info;

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{job_spec, runner_for, CommandOutput, Context};

pub async fn run(args: &FetchArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let operation = Operation::parse(&args.operation)?;
    let mut spec = job_spec(&args.root, operation, Some(&args.range), &args.window)?;
    spec.ivl_ms = args.ivl;

    let report = runner_for(context, &args.window)?.run(&spec).await?;
    let combined = report.combined();
    info!(
        root = %report.root,
        rows = combined.table.len(),
        failures = report.failure_count(),
        "fetch complete"
    );

    Ok(CommandOutput {
        data: serde_json::to_value(&report)?,
        rows: Some(serde_json::to_value(&combined.table)?),
        failures: report.failure_count(),
    })
}
