//! The cumulative run table and its CSV / JSON forms.
//!
//! CSV cells follow one rule: numbers are written bare, text is always
//! quoted, and an absent value is an empty bare cell. Reading a table back
//! therefore restores every value with its original type.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use color_eyre::eyre::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::record::{column_rank, FieldValue, RunId, RunMetrics, RunRecord, ID_COLUMNS, TABLE_TIME_FORMAT};

/// Errors reading a run table
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("Row {row}: expected {expected} cells, found {found}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Row {row}: invalid timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("Unterminated quoted cell starting on row {0}")]
    Unterminated(usize),
}

/// Raised when no run in a series produced a single usable measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub runs: usize,
    pub message: String,
}

impl std::fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} runs)", self.message, self.runs)
    }
}

/// Append-only table of run records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTable {
    records: Vec<RunRecord>,
}

impl RunTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<RunRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flatten one run's metrics into a new row. Statistics are taken as
    /// given, never recomputed.
    pub fn append_run(&mut self, id: RunId, metrics: &RunMetrics) -> &RunRecord {
        let record = RunRecord {
            id,
            fields: metrics.flatten(),
        };
        info!(
            "Appended run {} with {} fields",
            record.id.label(),
            record.fields.len()
        );
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn export(&self) -> ExportedTable {
        export_table(&self.records)
    }

    pub fn assess_quality(&self) -> Option<DataQualityWarning> {
        assess_quality(&self.records)
    }
}

/// Rectangular form of a set of records: the union of every field seen,
/// missing cells padded with `None`
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<FieldValue>>>,
}

pub fn export_table(records: &[RunRecord]) -> ExportedTable {
    let mut extra: Vec<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();
    extra.sort_by(|a, b| column_rank(a).cmp(&column_rank(b)).then(a.cmp(b)));
    extra.dedup();

    let columns: Vec<String> = ID_COLUMNS
        .iter()
        .copied()
        .chain(extra)
        .map(str::to_string)
        .collect();

    let rows = records
        .iter()
        .map(|record| {
            let mut row = vec![
                Some(FieldValue::Text(record.id.test_id.clone())),
                record.id.run_name.clone().map(FieldValue::Text),
                Some(FieldValue::Text(
                    record.id.timestamp.format(TABLE_TIME_FORMAT).to_string(),
                )),
            ];
            row.extend(
                columns[ID_COLUMNS.len()..]
                    .iter()
                    .map(|c| record.fields.get(c).cloned()),
            );
            row
        })
        .collect();

    ExportedTable { columns, rows }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn csv_cell(cell: &Option<FieldValue>) -> String {
    match cell {
        None => String::new(),
        Some(FieldValue::Num(v)) => v.to_string(),
        Some(FieldValue::Text(s)) => quote(s),
    }
}

impl ExportedTable {
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        let header: Vec<String> = self.columns.iter().map(|c| quote(c)).collect();
        writeln!(out, "{}", header.join(","))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(csv_cell).collect();
            writeln!(out, "{}", cells.join(","))?;
        }
        out.flush()
    }

    pub fn to_csv_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_csv(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// One parsed CSV cell, keeping whether it was quoted
#[derive(Debug, Clone, PartialEq)]
enum RawCell {
    Bare(String),
    Quoted(String),
}

impl RawCell {
    fn text(&self) -> &str {
        match self {
            RawCell::Bare(s) | RawCell::Quoted(s) => s,
        }
    }
}

fn parse_csv(text: &str) -> Result<Vec<Vec<RawCell>>, TableError> {
    let mut rows = Vec::new();
    let mut row: Vec<RawCell> = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    let finish_cell = |row: &mut Vec<RawCell>, cell: &mut String, quoted: &mut bool| {
        let value = std::mem::take(cell);
        row.push(if *quoted {
            RawCell::Quoted(value)
        } else {
            RawCell::Bare(value)
        });
        *quoted = false;
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                quoted = true;
            }
            ',' => finish_cell(&mut row, &mut cell, &mut quoted),
            '\r' => {}
            '\n' => {
                finish_cell(&mut row, &mut cell, &mut quoted);
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(c),
        }
    }

    if in_quotes {
        return Err(TableError::Unterminated(rows.len() + 1));
    }
    if !cell.is_empty() || quoted || !row.is_empty() {
        finish_cell(&mut row, &mut cell, &mut quoted);
        rows.push(row);
    }

    Ok(rows)
}

/// Rebuild records from CSV text produced by [`ExportedTable::write_csv`]
pub fn import_csv(text: &str) -> Result<Vec<RunRecord>, TableError> {
    let mut rows = parse_csv(text)?.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = header.iter().map(|c| c.text().to_string()).collect();

    let position = |name: &'static str| {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or(TableError::MissingColumn(name))
    };
    let test_id_col = position("test_id")?;
    let run_name_col = position("run_name")?;
    let timestamp_col = position("timestamp")?;

    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        let row_no = i + 1;
        if row.len() == 1 && row[0] == RawCell::Bare(String::new()) {
            continue;
        }
        if row.len() != columns.len() {
            return Err(TableError::RowWidth {
                row: row_no,
                expected: columns.len(),
                found: row.len(),
            });
        }

        let ts_text = row[timestamp_col].text();
        let timestamp = NaiveDateTime::parse_from_str(ts_text, TABLE_TIME_FORMAT).map_err(|_| {
            TableError::InvalidTimestamp {
                row: row_no,
                value: ts_text.to_string(),
            }
        })?;
        let run_name = match &row[run_name_col] {
            RawCell::Bare(s) if s.is_empty() => None,
            cell => Some(cell.text().to_string()),
        };
        let id = RunId::new(row[test_id_col].text(), run_name, timestamp);

        let fields = columns
            .iter()
            .zip(row)
            .enumerate()
            .filter(|(idx, _)| ![test_id_col, run_name_col, timestamp_col].contains(idx))
            .filter_map(|(_, (name, cell))| {
                let value = match cell {
                    RawCell::Bare(s) if s.is_empty() => return None,
                    RawCell::Quoted(s) => FieldValue::Text(s),
                    // Hand-edited tables may carry bare text
                    RawCell::Bare(s) => match s.trim().parse::<f64>() {
                        Ok(v) => FieldValue::Num(v),
                        Err(_) => FieldValue::Text(s),
                    },
                };
                Some((name.clone(), value))
            })
            .collect();

        records.push(RunRecord { id, fields });
    }

    Ok(records)
}

pub fn write_csv(path: &Path, records: &[RunRecord]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    export_table(records)
        .write_csv(BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_csv(path: &Path) -> Result<Vec<RunRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    import_csv(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn write_json(path: &Path, records: &[RunRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_json(path: &Path) -> Result<Vec<RunRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Warn when not a single run in the series carries a usable measurement
pub fn assess_quality(records: &[RunRecord]) -> Option<DataQualityWarning> {
    if records.iter().any(RunRecord::has_usable_probe) {
        return None;
    }
    let warning = DataQualityWarning {
        runs: records.len(),
        message: "No usable bandwidth or latency measurement in any run".to_string(),
    };
    warn!("{}", warning);
    Some(warning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeKind, ProbeStatus};
    use crate::stats::{summarize, SampleSeries};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y%m%d_%H%M%S").unwrap()
    }

    fn latency_metrics(values: &[Option<f64>]) -> RunMetrics {
        let mut metrics = RunMetrics::default();
        let series = SampleSeries::from_values(values.iter().copied());
        metrics.latency.insert(ProbeKind::PingWan, summarize(&series));
        metrics.set_status(ProbeKind::PingWan, ProbeStatus::Ok { attempts: 1 });
        metrics
    }

    fn sample_table() -> RunTable {
        let mut table = RunTable::new();
        table.append_run(
            RunId::new("NIC_A", Some("pos, \"near\"".to_string()), ts("20250106_100000")),
            &latency_metrics(&[Some(10.1), None, Some(0.1 + 0.2)]),
        );
        let mut udp = RunMetrics::default();
        udp.gateway = Some("192.168.1.1".to_string());
        udp.set_status(ProbeKind::UdpUpload, ProbeStatus::Failed { attempts: 8 });
        table.append_run(RunId::new("NIC_B", None, ts("20250106_110000")), &udp);
        table
    }

    #[test]
    fn test_export_is_union_of_fields() {
        let table = sample_table();
        let exported = table.export();
        assert_eq!(&exported.columns[..3], &["test_id", "run_name", "timestamp"]);
        assert!(exported.columns.contains(&"ping_wan_mean_ms".to_string()));
        assert!(exported.columns.contains(&"udp_ul_status".to_string()));
        assert!(exported.columns.contains(&"gateway".to_string()));

        let mean_col = exported.columns.iter().position(|c| c == "ping_wan_mean_ms").unwrap();
        assert!(exported.rows[0][mean_col].is_some());
        assert_eq!(exported.rows[1][mean_col], None);
        assert_eq!(exported.rows[1][1], None);
    }

    #[test]
    fn test_csv_round_trip_is_exact() {
        let table = sample_table();
        let csv = table.export().to_csv_string();
        let back = import_csv(&csv).unwrap();
        assert_eq!(back, table.records());
    }

    #[test]
    fn test_csv_round_trip_keeps_sub_second_timestamp() {
        let stamp = ts("20250106_100000") + chrono::Duration::nanoseconds(123_456_789);
        let mut table = RunTable::new();
        let metrics = RunMetrics {
            gateway: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        table.append_run(RunId::new("NIC_A", None, stamp), &metrics);

        let csv = table.export().to_csv_string();
        assert!(csv.contains("\"2025-01-06T10:00:00.123456789\""));
        let back = import_csv(&csv).unwrap();
        assert_eq!(back[0].id.timestamp, stamp);
        assert_eq!(back, table.records());
    }

    #[test]
    fn test_csv_cell_rules() {
        let csv = sample_table().export().to_csv_string();
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("\"test_id\",\"run_name\",\"timestamp\""));
        let second = csv.lines().nth(2).unwrap();
        // Missing run name is an empty bare cell, not ""
        assert!(second.starts_with("\"NIC_B\",,\"2025-01-06T11:00:00\""));
        assert!(csv.contains("\"pos, \"\"near\"\"\""));
    }

    #[test]
    fn test_import_errors() {
        assert!(matches!(
            import_csv("\"test_id\",\"timestamp\"\n\"a\",\"2025-01-06T10:00:00\"\n"),
            Err(TableError::MissingColumn("run_name"))
        ));
        assert!(matches!(
            import_csv("\"test_id\",\"run_name\",\"timestamp\"\n\"a\",,\n"),
            Err(TableError::InvalidTimestamp { row: 1, .. })
        ));
        assert!(matches!(
            import_csv("\"test_id\",\"run_name\",\"timestamp\"\n\"a\"\n"),
            Err(TableError::RowWidth { row: 1, expected: 3, found: 1 })
        ));
        assert!(matches!(import_csv("\"open"), Err(TableError::Unterminated(_))));
        assert!(import_csv("").unwrap().is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let table = sample_table();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        write_json(tmp.path(), table.records()).unwrap();
        assert_eq!(read_json(tmp.path()).unwrap(), table.records());
    }

    #[test]
    fn test_quality_warning_only_when_every_run_is_empty() {
        let table = sample_table();
        assert!(table.assess_quality().is_none());

        let mut empty = RunTable::new();
        empty.append_run(RunId::new("x", None, ts("20250106_100000")), &RunMetrics::default());
        let warning = empty.assess_quality().unwrap();
        assert_eq!(warning.runs, 1);
        assert!(assess_quality(&[]).is_some());
    }
}
