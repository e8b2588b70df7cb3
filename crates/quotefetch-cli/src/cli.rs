//! CLI argument definitions for quotefetch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `expirations` | List expirations for a root |
//! | `strikes` | List strikes for one expiration |
//! | `get` | Execute a single contract |
//! | `windows` | Discover available dates and print date windows |
//! | `fetch` | Run a full list → discover → window → fetch job |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--host` / `--port` | `127.0.0.1:25510` | Quote server address |
//! | `--config-id` | none | Port offset from 25510 |
//! | `--batch-size` | `128` | Contracts per batch |
//! | `--timeout-secs` | `120` | Batch drain budget |
//! | `--max-retry` | `3` | Batch retries per run |
//! | `--sleep-secs` | `30` | Base pause before a batch retry |
//! | `--format` | `json` | Output format (json, ndjson) |
//! | `--output` | stdout | Write to a file instead |
//! | `--strict` | `false` | Exit non-zero on any unresolved contract |
//!
//! # Examples
//!
//! ```bash
//! quotefetch expirations AAPL
//! quotefetch windows AAPL --exp 20230317 --policy cutoff:5 --granularity week
//! quotefetch fetch AAPL --operation hist_eod --frequency monthly --strike-multiple 5 \
//!     --format ndjson --output data/aapl_eod.ndjson
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// quotefetch - batch historical options data from a local quote server
#[derive(Debug, Parser)]
#[command(
    name = "quotefetch",
    author,
    version,
    about = "Batch historical options data from a local quote server",
    long_about = "quotefetch turns option roots into batches of quote-server requests, \
retries slow batches with escalating timeouts, and writes the assembled rows as JSON.\n\
\n\
Settings not given on the command line are read from QUOTEFETCH_* environment variables."
)]
pub struct Cli {
    /// Quote server host.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Quote server port.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Port offset added to 25510 when no port is given.
    #[arg(long, global = true)]
    pub config_id: Option<u16>,

    /// Maximum contracts in flight per batch.
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Seconds a batch may take before it is abandoned and retried.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Batch retries allowed across the whole run.
    #[arg(long, global = true)]
    pub max_retry: Option<u32>,

    /// Base pause in seconds before a retried batch.
    #[arg(long, global = true)]
    pub sleep_secs: Option<u64>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    pub request_timeout_secs: Option<u64>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Write output to this file. Existing files are left alone unless `--force` is set.
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file.
    #[arg(long, global = true, default_value_t = false)]
    pub force: bool,

    /// Treat any failed contract or expiration as an error (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON document.
    Json,
    /// One JSON object per line.
    Ndjson,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List expirations for a root.
    Expirations(ExpirationsArgs),
    /// List strikes for one expiration.
    Strikes(StrikesArgs),
    /// Execute a single contract.
    Get(GetArgs),
    /// Discover available dates for one expiration and print date windows.
    Windows(WindowsArgs),
    /// Run a full acquisition job.
    Fetch(FetchArgs),
}

#[derive(Debug, Args)]
pub struct ExpirationsArgs {
    pub root: String,

    #[command(flatten)]
    pub range: ExpiryRangeArgs,
}

#[derive(Debug, Args)]
pub struct ExpiryRangeArgs {
    /// Earliest expiration to keep (YYYYMMDD).
    #[arg(long)]
    pub min_exp: Option<String>,

    /// Latest expiration to keep (YYYYMMDD).
    #[arg(long)]
    pub max_exp: Option<String>,

    /// `all` or `monthly` (third Fridays).
    #[arg(long, default_value = "all")]
    pub frequency: String,
}

#[derive(Debug, Args)]
pub struct StrikesArgs {
    pub root: String,

    /// Expiration (YYYYMMDD).
    #[arg(long)]
    pub exp: String,

    /// Keep strikes on this whole-dollar step.
    #[arg(long)]
    pub strike_multiple: Option<u32>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Operation name, e.g. `hist_quote`, `list_dates_trade`, `bulk_hist_eod`.
    pub operation: String,

    #[arg(long)]
    pub root: String,

    /// `option` or `stock`.
    #[arg(long, default_value = "option")]
    pub security: String,

    #[arg(long)]
    pub exp: Option<String>,

    /// Strike in dollars.
    #[arg(long)]
    pub strike: Option<f64>,

    /// `C`/`call` or `P`/`put`.
    #[arg(long)]
    pub right: Option<String>,

    #[arg(long)]
    pub start_date: Option<String>,

    #[arg(long)]
    pub end_date: Option<String>,

    /// Bar interval in milliseconds.
    #[arg(long)]
    pub ivl: Option<u64>,

    /// Extra query parameter as `key=value`; repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

/// Discovery and windowing shared by `windows` and `fetch`.
#[derive(Debug, Args)]
pub struct WindowArgs {
    /// Dataset used for list-dates discovery.
    #[arg(long, default_value = "implied_volatility")]
    pub discovery: String,

    /// Keep strikes on this whole-dollar step.
    #[arg(long)]
    pub strike_multiple: Option<u32>,

    /// Rights to discover, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "C,P")]
    pub rights: Vec<String>,

    /// `all`, `yesterday`, `cutoff:N` or `date:YYYYMMDD`.
    #[arg(long, default_value = "all")]
    pub policy: String,

    /// `day`, `week` or `month`.
    #[arg(long, default_value = "day")]
    pub granularity: String,

    /// Reference date for the `yesterday` policy (YYYYMMDD); defaults to today (UTC).
    #[arg(long)]
    pub today: Option<String>,

    /// Extra query parameter copied onto every window, as `key=value`; repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WindowsArgs {
    pub root: String,

    #[arg(long)]
    pub exp: String,

    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    pub root: String,

    /// Operation fetched for every window.
    #[arg(long, default_value = "hist_eod")]
    pub operation: String,

    /// Bar interval in milliseconds.
    #[arg(long)]
    pub ivl: Option<u64>,

    #[command(flatten)]
    pub range: ExpiryRangeArgs,

    #[command(flatten)]
    pub window: WindowArgs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fetch_parses_window_options() {
        let cli = Cli::try_parse_from([
            "quotefetch",
            "fetch",
            "AAPL",
            "--operation",
            "at_time_quote",
            "--policy",
            "cutoff:5",
            "--rights",
            "call",
            "--param",
            "ms_of_day=34200000",
            "--format",
            "ndjson",
        ])
        .expect("valid arguments");

        assert_eq!(cli.format, OutputFormat::Ndjson);
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.operation, "at_time_quote");
        assert_eq!(args.window.policy, "cutoff:5");
        assert_eq!(args.window.rights, ["call"]);
        assert_eq!(args.window.params, ["ms_of_day=34200000"]);
        assert_eq!(args.range.frequency, "all");
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["quotefetch", "expirations", "SPY", "--port", "25511"])
            .expect("valid arguments");
        assert_eq!(cli.port, Some(25511));
    }
}
