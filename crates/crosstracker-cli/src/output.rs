//! Rendering of reports, explanations and errors for the terminal.

use clap::ValueEnum;

use crosstracker::result::{NumericValue, ValueRepresentation};
use crosstracker::{CrossTrackerQuery, QueryReport, TqlError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns, one artifact per line.
    #[default]
    Table,
    /// The report as pretty-printed JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

const MAX_CELL_WIDTH: usize = 40;

pub fn render_report(report: &QueryReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Table => Ok(render_table(report)),
    }
}

fn render_table(report: &QueryReport) -> String {
    let header: Vec<String> = report.selected.iter().map(|c| c.name.clone()).collect();
    let rows: Vec<Vec<String>> = report
        .artifacts
        .iter()
        .map(|artifact| {
            report
                .selected
                .iter()
                .map(|column| artifact.get(&column.name).map(cell).unwrap_or_default())
                .map(|text| truncate(&text, MAX_CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out.push_str(&format!(
        "{} of {} artifact(s)\n",
        report.artifacts.len(),
        report.total_size
    ));
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max - 1).collect();
    format!("{kept}…")
}

/// One line summary of a value.
pub fn cell(value: &ValueRepresentation) -> String {
    match value {
        ValueRepresentation::Artifact { id, .. } => format!("#{id}"),
        ValueRepresentation::Date { value, .. } => value.clone().unwrap_or_default(),
        ValueRepresentation::Numeric { value } => match value {
            Some(NumericValue::Int(n)) => n.to_string(),
            Some(NumericValue::Float(n)) => n.to_string(),
            None => String::new(),
        },
        ValueRepresentation::Text { value, .. } => value
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
        ValueRepresentation::StaticList { value } => value
            .iter()
            .map(|v| v.label.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        ValueRepresentation::UserList { value } => value
            .iter()
            .map(|u| u.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        ValueRepresentation::UserGroupList { value } => value
            .iter()
            .map(|g| g.label.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        ValueRepresentation::User(user) => user.display_name.clone(),
        ValueRepresentation::PrettyTitle {
            tracker_name,
            artifact_id,
            title,
            ..
        } => format!("{tracker_name} #{artifact_id} {title}"),
        ValueRepresentation::Project { name, icon } if icon.is_empty() => name.clone(),
        ValueRepresentation::Project { name, icon } => format!("{icon} {name}"),
        ValueRepresentation::Tracker { name, .. } => name.clone(),
    }
}

pub fn render_queries(queries: &[CrossTrackerQuery]) -> String {
    if queries.is_empty() {
        return "No saved query.\n".to_string();
    }
    let mut out = String::new();
    for query in queries {
        let title = if query.title.is_empty() { "(untitled)" } else { &query.title };
        out.push_str(&format!("{}  {title}\n    {}\n", query.uuid, query.query));
        if !query.description.is_empty() {
            out.push_str(&format!("    {}\n", query.description));
        }
    }
    out
}

/// Message for an error, listing faults one per line.
pub fn describe_error(error: &TqlError) -> String {
    match error {
        TqlError::Invalid(faults) => {
            let mut out = String::from("Invalid query:");
            for fault in faults.iter() {
                out.push_str(&format!("\n  - [{}] {fault}", fault.code()));
            }
            out
        }
        other => other.to_string(),
    }
}
