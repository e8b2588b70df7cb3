use quotefetch_core::job::select_expirations;
use quotefetch_core::{ExpiryFrequency, QuoteDate, Root};
use serde::Serialize;

use crate::cli::ExpirationsArgs;
use crate::error::CliError;

use super::{parse_optional_date, CommandOutput, Context};

#[derive(Debug, Serialize)]
struct ExpirationsData {
    root: Root,
    listed: usize,
    expirations: Vec<QuoteDate>,
}

pub async fn run(args: &ExpirationsArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let root = Root::parse(&args.root)?;
    let frequency = args.range.frequency.parse::<ExpiryFrequency>()?;
    let min = parse_optional_date(args.range.min_exp.as_deref())?;
    let max = parse_optional_date(args.range.max_exp.as_deref())?;

    let listed = context.runner.list_expirations(&root).await?;
    let expirations = select_expirations(&listed, min, max, frequency);

    let data = serde_json::to_value(ExpirationsData {
        root,
        listed: listed.len(),
        expirations,
    })?;
    let rows = data.get("expirations").cloned();
    Ok(CommandOutput {
        rows,
        ..CommandOutput::data(data)
    })
}
