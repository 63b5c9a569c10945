//! Result building: runs the select statements of a page and merges their
//! rows into one representation per artifact and column.

pub mod representation;

use std::collections::{BTreeMap, HashMap};

use chrono::FixedOffset;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Row};
use serde::Serialize;

use crate::builder::select::{RowShape, SelectColumn};
use crate::builder::CompiledQuery;
use crate::config::EngineConfig;
use crate::datetime;
use crate::types::{ArtifactId, TqlResult};

pub use representation::{
    NumericValue, StaticListValue, UserGroupValue, UserRepresentation, ValueRepresentation,
};

/// A column of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Values of one artifact, keyed by column name.
pub type ArtifactValues = BTreeMap<String, ValueRepresentation>;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub selected: Vec<SelectedColumn>,
    pub artifacts: Vec<ArtifactValues>,
    pub total_size: usize,
}

impl QueryReport {
    /// Value of `column` for the artifact at `index`.
    pub fn value(&self, index: usize, column: &str) -> Option<&ValueRepresentation> {
        self.artifacts.get(index)?.get(column)
    }
}

/// Build the report of a page, keeping the order of `artifact_ids`.
pub fn build_report(
    conn: &Connection,
    compiled: &CompiledQuery,
    artifact_ids: &[ArtifactId],
    total_size: usize,
    config: &EngineConfig,
) -> TqlResult<QueryReport> {
    let tz = config.timezone();
    let mut artifacts: Vec<ArtifactValues> = artifact_ids.iter().map(|_| BTreeMap::new()).collect();

    if !artifact_ids.is_empty() {
        for (column, statement) in compiled.select_statements(artifact_ids) {
            let mut stmt = conn.prepare(&statement.sql)?;
            let mut rows = stmt.query(params_from_iter(statement.parameters.iter()))?;
            let mut values: HashMap<ArtifactId, ValueRepresentation> = HashMap::new();
            while let Some(row) = rows.next()? {
                read_row(row, column.shape, &mut values, tz, config)?;
            }
            for (artifact, id) in artifacts.iter_mut().zip(artifact_ids) {
                let value = values
                    .remove(id)
                    .unwrap_or_else(|| empty(column.shape, *id, config));
                artifact.insert(column.name.clone(), value);
            }
        }
    }

    Ok(QueryReport {
        selected: compiled.columns.iter().map(selected).collect(),
        artifacts,
        total_size,
    })
}

fn selected(column: &SelectColumn) -> SelectedColumn {
    SelectedColumn {
        name: column.name.clone(),
        column_type: column.column_type.to_string(),
    }
}

/// Representation of an artifact without value for a column.
fn empty(shape: RowShape, artifact_id: ArtifactId, config: &EngineConfig) -> ValueRepresentation {
    match shape {
        RowShape::Artifact => ValueRepresentation::artifact(artifact_id, config),
        RowShape::Date => ValueRepresentation::Date {
            value: None,
            with_time: false,
        },
        RowShape::Numeric => ValueRepresentation::Numeric { value: None },
        RowShape::Text => ValueRepresentation::empty_text(),
        RowShape::StaticList => ValueRepresentation::StaticList { value: Vec::new() },
        RowShape::UserList => ValueRepresentation::UserList { value: Vec::new() },
        RowShape::UserGroupList => ValueRepresentation::UserGroupList { value: Vec::new() },
        RowShape::User => ValueRepresentation::User(UserRepresentation::anonymous(None, config)),
        RowShape::Project => ValueRepresentation::Project {
            name: String::new(),
            icon: String::new(),
        },
        RowShape::Tracker => ValueRepresentation::Tracker {
            name: String::new(),
            color: String::new(),
        },
        RowShape::PrettyTitle => ValueRepresentation::PrettyTitle {
            tracker_name: String::new(),
            color: String::new(),
            artifact_id,
            title: String::new(),
        },
    }
}

fn read_row(
    row: &Row<'_>,
    shape: RowShape,
    values: &mut HashMap<ArtifactId, ValueRepresentation>,
    tz: FixedOffset,
    config: &EngineConfig,
) -> TqlResult<()> {
    let artifact_id: ArtifactId = row.get(0)?;
    let value = match shape {
        RowShape::Artifact => ValueRepresentation::artifact(artifact_id, config),
        RowShape::Date => {
            let with_time: bool = row.get(1)?;
            let timestamp: Option<i64> = row.get(2)?;
            ValueRepresentation::Date {
                value: timestamp.and_then(|ts| datetime::to_rfc3339(ts, tz)),
                with_time,
            }
        }
        RowShape::Numeric => {
            let value = match row.get::<_, SqlValue>(1)? {
                SqlValue::Integer(n) => Some(NumericValue::Int(n)),
                SqlValue::Real(n) => Some(NumericValue::Float(n)),
                _ => None,
            };
            ValueRepresentation::Numeric { value }
        }
        RowShape::Text => {
            let value: Option<String> = row.get(1)?;
            let format: Option<String> = row.get(2)?;
            ValueRepresentation::Text {
                value,
                format: format.unwrap_or_else(|| "text".to_string()),
            }
        }
        RowShape::StaticList => {
            let item = StaticListValue {
                label: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                color: row.get(2)?,
            };
            if let ValueRepresentation::StaticList { value } = list_entry(values, artifact_id, shape, config) {
                value.push(item);
            }
            return Ok(());
        }
        RowShape::UserList => {
            let id: Option<i64> = row.get(1)?;
            let label: Option<String> = row.get(2)?;
            let real_name: Option<String> = row.get(3)?;
            let avatar_url: Option<String> = row.get(4)?;
            let item = UserRepresentation::build(
                id,
                id.and(label.as_deref()),
                real_name.as_deref(),
                avatar_url.as_deref(),
                label.as_deref(),
                config,
            );
            if let ValueRepresentation::UserList { value } = list_entry(values, artifact_id, shape, config) {
                value.push(item);
            }
            return Ok(());
        }
        RowShape::UserGroupList => {
            let item = UserGroupValue {
                label: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            };
            if let ValueRepresentation::UserGroupList { value } = list_entry(values, artifact_id, shape, config) {
                value.push(item);
            }
            return Ok(());
        }
        RowShape::User => {
            let id: Option<i64> = row.get(1)?;
            let user_name: Option<String> = row.get(2)?;
            let real_name: Option<String> = row.get(3)?;
            let avatar_url: Option<String> = row.get(4)?;
            ValueRepresentation::User(UserRepresentation::build(
                id,
                user_name.as_deref(),
                real_name.as_deref(),
                avatar_url.as_deref(),
                None,
                config,
            ))
        }
        RowShape::Project => ValueRepresentation::Project {
            name: row.get(1)?,
            icon: row.get(2)?,
        },
        RowShape::Tracker => ValueRepresentation::Tracker {
            name: row.get(1)?,
            color: row.get(2)?,
        },
        RowShape::PrettyTitle => ValueRepresentation::PrettyTitle {
            tracker_name: row.get(1)?,
            color: row.get(2)?,
            artifact_id,
            title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        },
    };
    values.insert(artifact_id, value);
    Ok(())
}

/// Value of an artifact for a list column, created empty on first use.
fn list_entry<'v>(
    values: &'v mut HashMap<ArtifactId, ValueRepresentation>,
    artifact_id: ArtifactId,
    shape: RowShape,
    config: &EngineConfig,
) -> &'v mut ValueRepresentation {
    values
        .entry(artifact_id)
        .or_insert_with(|| empty(shape, artifact_id, config))
}
