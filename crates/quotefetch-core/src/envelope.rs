//! Quote-server response envelope parsing and row decoding.
//!
//! The server wraps every payload as `{header: {...}, response: [...]}`. A
//! header `error_type` of null or `"null"` (any case) marks success; anything else
//! is classified by substring match on `error_msg`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::Operation;
use crate::http_client::HttpResponse;

/// One decoded row keyed by column name.
pub type Record = Map<String, Value>;

const ROOT_OR_EXPIRATION_MARKER: &str = "nonexistent root symbol or expiration";
const NO_DATA_MARKER: &str = "no data";

/// Classification of the header error signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    RootOrExpirationInvalid,
    NoDataForContract,
    OtherFormatError,
}

impl ErrorKind {
    fn classify(message: Option<&str>) -> Self {
        let lowered = message.unwrap_or_default().to_ascii_lowercase();
        if lowered.contains(ROOT_OR_EXPIRATION_MARKER) {
            Self::RootOrExpirationInvalid
        } else if lowered.contains(NO_DATA_MARKER) {
            Self::NoDataForContract
        } else {
            Self::OtherFormatError
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RootOrExpirationInvalid => "root_or_expiration_invalid",
            Self::NoDataForContract => "no_data_for_contract",
            Self::OtherFormatError => "other_format_error",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("transport returned HTTP {status}")]
    Transport { status: u16 },
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String },
    #[error("nonexistent root or expiration: {message}")]
    RootOrExpirationInvalid { message: String },
    #[error("no data for contract: {message}")]
    NoData { message: String },
    #[error("server error '{error_type}': {message}")]
    OtherFormat { error_type: String, message: String },
    #[error("envelope reported success but carried no rows")]
    EmptyResponse,
    #[error("row {row} has {actual} values but format lists {expected} columns")]
    RowTooShort {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

impl EnvelopeError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RootOrExpirationInvalid { .. } => ErrorKind::RootOrExpirationInvalid,
            Self::NoData { .. } => ErrorKind::NoDataForContract,
            _ => ErrorKind::OtherFormatError,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    header: Option<RawHeader>,
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    #[serde(default)]
    error_type: Value,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    format: Option<Vec<String>>,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    latency_ms: Option<u64>,
}

/// Parsed but not yet decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub transport_status: u16,
    pub error_kind: ErrorKind,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub format: Option<Vec<String>>,
    pub request_id: Option<String>,
    pub latency_ms: Option<u64>,
    raw_rows: Value,
}

impl ResponseEnvelope {
    /// The header error as a typed failure, `None` when the server reported success.
    pub fn error(&self) -> Option<EnvelopeError> {
        let message = self.error_message.clone().unwrap_or_default();
        match self.error_kind {
            ErrorKind::None => None,
            ErrorKind::RootOrExpirationInvalid => {
                Some(EnvelopeError::RootOrExpirationInvalid { message })
            }
            ErrorKind::NoDataForContract => Some(EnvelopeError::NoData { message }),
            ErrorKind::OtherFormatError => Some(EnvelopeError::OtherFormat {
                error_type: self.error_type.clone().unwrap_or_default(),
                message,
            }),
        }
    }
}

/// Validate transport status and read the header.
pub fn parse(response: &HttpResponse) -> Result<ResponseEnvelope, EnvelopeError> {
    if !response.is_success() {
        return Err(EnvelopeError::Transport {
            status: response.status,
        });
    }

    let raw: RawEnvelope =
        serde_json::from_str(&response.body).map_err(|e| EnvelopeError::Malformed {
            reason: e.to_string(),
        })?;
    let header = raw.header.ok_or_else(|| EnvelopeError::Malformed {
        reason: String::from("missing header"),
    })?;

    let error_type = match header.error_type {
        Value::Null => None,
        Value::String(text) if text.eq_ignore_ascii_case("null") => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    };
    let error_kind = match error_type {
        None => ErrorKind::None,
        Some(_) => ErrorKind::classify(header.error_msg.as_deref()),
    };
    let request_id = match header.id {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    };

    Ok(ResponseEnvelope {
        transport_status: response.status,
        error_kind,
        error_type,
        error_message: header.error_msg,
        format: header.format,
        request_id,
        latency_ms: header.latency_ms,
        raw_rows: raw.response,
    })
}

/// Decode raw rows into named records.
///
/// Rows are only read when the header reported success.
pub fn decode(
    envelope: &ResponseEnvelope,
    operation: Operation,
) -> Result<Vec<Record>, EnvelopeError> {
    if let Some(error) = envelope.error() {
        return Err(error);
    }

    let rows = match &envelope.raw_rows {
        Value::Array(rows) if !rows.is_empty() => rows,
        _ => return Err(EnvelopeError::EmptyResponse),
    };

    match envelope.format.as_deref() {
        None => Ok(rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                record.insert(operation.record_key().to_owned(), row.clone());
                record
            })
            .collect()),
        Some(format) if operation.is_bulk() => decode_bulk(format, rows),
        Some(format) => rows
            .iter()
            .enumerate()
            .map(|(index, row)| zip_row(format, row, index))
            .collect(),
    }
}

fn zip_row(format: &[String], row: &Value, index: usize) -> Result<Record, EnvelopeError> {
    let values = row.as_array().ok_or_else(|| EnvelopeError::Malformed {
        reason: format!("row {index} is not an array"),
    })?;
    if values.len() < format.len() {
        return Err(EnvelopeError::RowTooShort {
            row: index,
            expected: format.len(),
            actual: values.len(),
        });
    }
    Ok(format
        .iter()
        .cloned()
        .zip(values.iter().cloned())
        .collect())
}

fn decode_bulk(format: &[String], rows: &[Value]) -> Result<Vec<Record>, EnvelopeError> {
    let mut records = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let contract = match row.get("contract") {
            Some(Value::Object(fields)) => fields,
            _ => {
                return Err(EnvelopeError::Malformed {
                    reason: format!("bulk row {index} has no contract object"),
                })
            }
        };
        let ticks = row
            .get("ticks")
            .and_then(Value::as_array)
            .ok_or_else(|| EnvelopeError::Malformed {
                reason: format!("bulk row {index} has no ticks list"),
            })?;

        for tick in ticks {
            let mut record = contract.clone();
            record.extend(zip_row(format, tick, index)?);
            records.push(record);
        }
    }
    Ok(records)
}
