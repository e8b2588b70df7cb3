use quotefetch_core::{
    ContractFactory, FetchParams, Identity, Operation, OptionLeg, QuoteDate, ResultAssembler, Right,
    Root, SecurityType, Strike,
};
use serde_json::json;

use crate::cli::GetArgs;
use crate::error::CliError;

use super::{parse_optional_date, parse_params, CommandOutput, Context};

pub async fn run(args: &GetArgs, context: &Context) -> Result<CommandOutput, CliError> {
    let operation = Operation::parse(&args.operation)?;
    let security = match args.security.trim().to_ascii_lowercase().as_str() {
        "option" => SecurityType::Option,
        "stock" => SecurityType::Stock,
        other => {
            return Err(CliError::Command(format!(
                "security must be option or stock, got '{other}'"
            )))
        }
    };

    let request = context
        .factory
        .build(security, identity(args)?, operation, &params(args)?)?;
    let results = context
        .scheduler
        .run(std::slice::from_ref(&request))
        .await?;
    let assembled = ResultAssembler::assemble(std::slice::from_ref(&request), &results);

    let data = json!({
        "contract": request,
        "outcome": results.first().map(|result| &result.outcome),
        "diagnostics": results.first().map(|result| &result.diagnostics),
        "rows": assembled.table,
    });
    let rows = data.get("rows").cloned();
    Ok(CommandOutput {
        data,
        rows,
        failures: assembled.failures.len(),
    })
}

fn identity(args: &GetArgs) -> Result<Identity, CliError> {
    let root = Root::parse(&args.root)?;
    let expiry = parse_optional_date(args.exp.as_deref())?;
    let leg = match (args.strike, args.right.as_deref()) {
        (Some(strike), Some(right)) => Some(OptionLeg::new(
            Strike::from_dollars(strike)?,
            Right::parse(right)?,
        )),
        (None, None) => None,
        _ => {
            return Err(CliError::Command(String::from(
                "--strike and --right must be given together",
            )))
        }
    };

    Ok(match (expiry, leg) {
        (None, None) => Identity::root(root),
        (Some(expiry), None) => Identity::expiration(root, expiry),
        (Some(expiry), Some(leg)) => Identity::series(root, expiry, leg),
        (None, Some(_)) => {
            return Err(CliError::Command(String::from(
                "--strike and --right need --exp",
            )))
        }
    })
}

fn params(args: &GetArgs) -> Result<FetchParams, CliError> {
    let start = parse_optional_date(args.start_date.as_deref())?;
    let end = parse_optional_date(args.end_date.as_deref())?;
    Ok(FetchParams {
        start_date: start,
        end_date: end.or(start),
        ivl_ms: args.ivl,
        extras: parse_params(&args.params)?,
    })
}
