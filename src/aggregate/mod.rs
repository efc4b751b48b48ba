//! Flattening of per-run metrics into the cumulative run table.

pub mod collect;
pub mod record;
pub mod table;

pub use collect::{collect_run, CollectedRun};
pub use record::{column_rank, FieldValue, RunId, RunMetrics, RunRecord, TABLE_TIME_FORMAT};
pub use table::{
    assess_quality, export_table, import_csv, read_csv, read_json, write_csv, write_json,
    DataQualityWarning, ExportedTable, RunTable, TableError,
};
