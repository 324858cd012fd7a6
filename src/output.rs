//! Output formatting for CLI display.
//!
//! Tables are built from normalized [`Record`]s so every report renders the
//! same way regardless of which endpoint produced the rows.

use std::collections::HashMap;

use tabled::builder::Builder;
use tabled::settings::Style;
use tabled::Tabled;

use crate::assemble::Record;
use crate::fanout::FetchResultSet;
use crate::models::SEVERITIES;

/// Render records as a table with an `id` column followed by `columns`.
pub fn records_table(records: &[Record], columns: &[&str]) -> String {
    let mut builder = Builder::default();
    builder.push_record(std::iter::once("id").chain(columns.iter().copied()));
    for record in records {
        let cells = columns
            .iter()
            .map(|c| record.get(c).map(ToString::to_string).unwrap_or_default());
        builder.push_record(std::iter::once(record.id.clone()).chain(cells));
    }
    builder.build().with(Style::sharp()).to_string()
}

/// Finding counts of one asset version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Tabled)]
pub struct SeverityBreakdown {
    /// Asset version id.
    #[tabled(rename = "asset version")]
    pub asset_version: String,
    /// All findings.
    pub total: usize,
    /// `CRITICAL` findings.
    pub critical: usize,
    /// `HIGH` findings.
    pub high: usize,
    /// `MEDIUM` findings.
    pub medium: usize,
    /// `LOW` findings.
    pub low: usize,
    /// Everything else.
    pub other: usize,
}

/// Count findings per asset version and severity, in asset version order.
///
/// Counts come from [`FetchResultSet::membership`], so a finding shared by
/// several versions is counted under each of them. Versions that completed
/// with no findings get a zero row; failed versions are omitted.
pub fn severity_breakdown(results: &FetchResultSet) -> Vec<SeverityBreakdown> {
    let by_id: HashMap<&str, &Record> = results
        .records
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();

    results
        .membership
        .iter()
        .map(|(version, ids)| {
            let mut row = SeverityBreakdown {
                asset_version: version.clone(),
                ..Default::default()
            };
            for record in ids.iter().filter_map(|id| by_id.get(id.as_str())) {
                row.total += 1;
                match record.text("severity").map(str::to_ascii_uppercase).as_deref() {
                    Some("CRITICAL") => row.critical += 1,
                    Some("HIGH") => row.high += 1,
                    Some("MEDIUM") => row.medium += 1,
                    Some("LOW") => row.low += 1,
                    _ => row.other += 1,
                }
            }
            row
        })
        .collect()
}

/// Sort key for a severity label; unknown labels sort last.
pub fn severity_rank(severity: &str) -> usize {
    SEVERITIES
        .iter()
        .position(|s| s.eq_ignore_ascii_case(severity))
        .unwrap_or(SEVERITIES.len())
}
