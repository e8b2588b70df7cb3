use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::cli::OutputFormat;
use crate::commands::CommandOutput;
use crate::error::CliError;

/// Where and how to write a command's output.
#[derive(Debug, Clone, Copy)]
pub struct Destination<'a> {
    pub format: OutputFormat,
    pub pretty: bool,
    pub path: Option<&'a Path>,
    pub force: bool,
}

pub fn render(output: &CommandOutput, destination: Destination<'_>) -> Result<(), CliError> {
    match destination.path {
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_to(&mut handle, output, destination)?;
            handle.flush()?;
        }
        Some(path) => {
            if path.exists() && !destination.force {
                warn!(path = %path.display(), "output file exists, skipping");
                return Ok(());
            }
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = io::BufWriter::new(fs::File::create(path)?);
            write_to(&mut file, output, destination)?;
            file.flush()?;
            info!(path = %path.display(), "output written");
        }
    }
    Ok(())
}

fn write_to<W: Write>(
    writer: &mut W,
    output: &CommandOutput,
    destination: Destination<'_>,
) -> Result<(), CliError> {
    match destination.format {
        OutputFormat::Json => {
            let payload = if destination.pretty {
                serde_json::to_string_pretty(&output.data)?
            } else {
                serde_json::to_string(&output.data)?
            };
            writeln!(writer, "{payload}")?;
        }
        OutputFormat::Ndjson => {
            let rows = output.rows.as_ref().unwrap_or(&output.data);
            match rows {
                Value::Array(items) => {
                    for item in items {
                        writeln!(writer, "{}", serde_json::to_string(item)?)?;
                    }
                }
                other => writeln!(writer, "{}", serde_json::to_string(other)?)?,
            }
        }
    }
    Ok(())
}
