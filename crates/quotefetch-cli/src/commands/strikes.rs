use quotefetch_core::job::select_strikes;
use quotefetch_core::{QuoteDate, Root};
use serde::Serialize;

use crate::cli::StrikesArgs;
use crate::error::CliError;

use super::{CommandOutput, Context};

#[derive(Debug, Serialize)]
struct StrikesData {
    root: Root,
    exp: QuoteDate,
    /// Dollar strikes.
    strikes: Vec<f64>,
}

pub async fn run(args: &StrikesArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let root = Root::parse(&args.root)?;
    let exp = QuoteDate::parse(&args.exp)?;

    let listed = context.runner.list_strikes(&root, exp).await?;
    let strikes = select_strikes(&listed, args.strike_multiple)
        .into_iter()
        .map(|strike| strike.dollars())
        .collect();

    let data = serde_json::to_value(StrikesData { root, exp, strikes })?;
    let rows = data.get("strikes").cloned();
    Ok(CommandOutput {
        rows,
        ..CommandOutput::data(data)
    })
}
