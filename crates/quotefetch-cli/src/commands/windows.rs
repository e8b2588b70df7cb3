use quotefetch_core::job::select_strikes;
use quotefetch_core::{DataKind, Operation, QuoteDate};
use serde_json::{json, Value};
use tracing::warn;

use crate::cli::WindowsArgs;
use crate::error::CliError;

use super::{job_spec, runner_for, CommandOutput, Context};

pub async fn run(args: &WindowsArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let expiry = QuoteDate::parse(&args.exp)?;
    let discovery = DataKind::parse(&args.window.discovery)?;
    let spec = job_spec(&args.root, Operation::ListDates(discovery), None, &args.window)?;
    let runner = runner_for(context, &args.window)?;

    let strikes = select_strikes(
        &runner.list_strikes(&spec.root, expiry).await?,
        spec.strike_multiple,
    );
    if strikes.is_empty() {
        warn!(root = %spec.root, %expiry, "no strikes selected");
    }
    let plan = runner.plan_windows(&spec, expiry, &strikes).await?;

    // A fully filtered expiry dumps what discovery saw so the policy can be checked.
    let unfiltered = if plan.filtered_out {
        Value::Array(plan.unfiltered_dump())
    } else {
        Value::Null
    };
    let windows = serde_json::to_value(&plan.windows)?;
    let data = json!({
        "root": spec.root,
        "exp": expiry,
        "policy": spec.policy.to_string(),
        "strikes": strikes.len(),
        "discovered": plan.discovered.len(),
        "filtered_out": plan.filtered_out,
        "windows": windows,
        "unfiltered": unfiltered,
        "failures": plan.failures,
    });

    Ok(CommandOutput {
        rows: Some(windows),
        failures: plan.failures.len(),
        data,
    })
}
