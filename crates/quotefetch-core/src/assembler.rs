use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::contract::{ContractRequest, ContractResult, QueryParams};
use crate::envelope::Record;
use crate::executor::{FetchErrorKind, FetchOutcome};

/// Records with a shared column list in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Record) {
        for key in row.keys() {
            if !self.columns.iter().any(|column| column == key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn append(&mut self, other: Table) {
        for row in other.rows {
            self.push(row);
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows re-keyed to the full column list; absent cells become `null`.
    pub fn aligned_rows(&self) -> impl Iterator<Item = AlignedRow<'_>> {
        self.rows.iter().map(|row| AlignedRow {
            columns: &self.columns,
            row,
        })
    }
}

/// One table row serialized in column order.
pub struct AlignedRow<'a> {
    columns: &'a [String],
    row: &'a Record,
}

impl Serialize for AlignedRow<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns {
            map.serialize_entry(column, self.row.get(column).unwrap_or(&Value::Null))?;
        }
        map.end()
    }
}

impl Serialize for Table {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.aligned_rows() {
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}

/// A contract that resolved to a failure, with what it takes to re-issue it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedContract {
    pub task_id: Uuid,
    pub contract: String,
    pub url: String,
    pub params: QueryParams,
    /// `url` with the encoded query appended.
    pub full_url: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledTable {
    pub table: Table,
    pub failures: Vec<FailedContract>,
    pub succeeded: usize,
    pub no_data: usize,
}

impl AssembledTable {
    pub fn merge(&mut self, other: AssembledTable) {
        self.table.append(other.table);
        self.failures.extend(other.failures);
        self.succeeded += other.succeeded;
        self.no_data += other.no_data;
    }
}

/// Joins decoded records back to the parameters that produced them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(requests: &[ContractRequest], results: &[ContractResult]) -> AssembledTable {
        let mut assembled = AssembledTable::default();

        for result in results {
            let Some(request) = requests.get(result.sequence) else {
                warn!(sequence = result.sequence, "result has no matching request");
                continue;
            };

            match &result.outcome {
                FetchOutcome::Success(records) => {
                    assembled.succeeded += 1;
                    for record in records {
                        assembled.table.push(augment(record, request, result));
                    }
                }
                FetchOutcome::NoData => assembled.no_data += 1,
                FetchOutcome::Failed(error) => assembled.failures.push(FailedContract {
                    task_id: result.task_id,
                    contract: request.to_string(),
                    url: request.url().to_owned(),
                    params: request.params().clone(),
                    full_url: request.full_url(),
                    kind: error.kind(),
                    message: error.message().to_owned(),
                }),
            }
        }

        assembled
    }
}

fn augment(record: &Record, request: &ContractRequest, result: &ContractResult) -> Record {
    let mut row = record.clone();
    for (key, value) in request.params().iter() {
        row.insert(key.to_owned(), Value::from(value));
    }
    let diagnostics = &result.diagnostics;
    row.insert(String::from("url"), Value::from(request.url()));
    row.insert(String::from("task_id"), Value::from(result.task_id.to_string()));
    row.insert(
        String::from("request_id"),
        diagnostics.request_id.clone().map_or(Value::Null, Value::from),
    );
    row.insert(
        String::from("latency_ms"),
        diagnostics.latency_ms.map_or(Value::Null, Value::from),
    );
    row.insert(
        String::from("error_kind"),
        diagnostics
            .error_kind
            .map_or(Value::Null, |kind| Value::from(kind.as_str())),
    );
    row
}
