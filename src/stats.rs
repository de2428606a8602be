//! Aggregates per-run CSV result files into one `summary.csv`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HisdbError, fs_error};

pub const SUMMARY_FILE: &str = "summary.csv";
pub const ERROR_LOG_FILE: &str = "error_log.txt";
const SEPARATOR: &str = "--------------------------------------------------";

/// Captured output of a run that did not produce results.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub label: String,
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsOutcome {
    pub files: usize,
    pub rows: usize,
    pub summary: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
}

/// CSV files directly inside `folder`, sorted by name, excluding an earlier
/// summary.
pub fn collect_csv_files(folder: &Path) -> Result<Vec<PathBuf>, HisdbError> {
    let entries = fs::read_dir(folder).map_err(|err| fs_error(folder, err))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| HisdbError::Filesystem(err.to_string()))?;
        let path = entry.path();
        let is_csv = path.is_file()
            && path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
        let is_summary = path.file_name().map(|name| name == SUMMARY_FILE).unwrap_or(false);
        if is_csv && !is_summary {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every record of `path`, header row included.
pub fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, HisdbError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|err| csv_error(path, err))?;
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| csv_error(path, err))?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

fn csv_error(path: &Path, err: csv::Error) -> HisdbError {
    HisdbError::Csv(format!("{}: {err}", path.display()))
}

/// Writes `summary.csv` (and `error_log.txt` when `failures` is non-empty)
/// into `folder`.
pub fn write_stats(folder: &Path, failures: &[RunFailure]) -> Result<StatsOutcome, HisdbError> {
    let files = collect_csv_files(folder)?;
    let mut outcome = StatsOutcome {
        files: files.len(),
        ..StatsOutcome::default()
    };

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for path in &files {
        let mut records = read_csv(path)?.into_iter();
        let Some(file_header) = records.next() else {
            tracing::warn!(file = %path.display(), "empty csv skipped");
            continue;
        };
        if header.is_none() {
            header = Some(file_header);
        } else if header.as_ref() != Some(&file_header) {
            tracing::warn!(file = %path.display(), "header differs from first file");
        }
        rows.extend(records.filter(|record| !record.is_empty()));
    }

    if let (Some(header), false) = (header, rows.is_empty()) {
        let mut columns = vec!["filename".to_string()];
        columns.extend(header.into_iter().skip(1));
        let path = folder.join(SUMMARY_FILE);
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer
            .write_record(&columns)
            .map_err(|err| csv_error(&path, err))?;
        for row in &rows {
            writer.write_record(row).map_err(|err| csv_error(&path, err))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| HisdbError::Csv(format!("{}: {err}", path.display())))?;
        write_atomic(&path, &bytes)?;
        outcome.rows = rows.len();
        outcome.summary = Some(path);
    }

    if !failures.is_empty() {
        let mut out = String::new();
        for failure in failures {
            tracing::warn!(label = %failure.label, lines = failure.output.len(), "run failed");
            for line in &failure.output {
                out.push_str(line.trim_end_matches('\n'));
                out.push('\n');
            }
            out.push('\n');
            out.push_str(SEPARATOR);
            out.push_str("\n\n");
        }
        let path = folder.join(ERROR_LOG_FILE);
        write_atomic(&path, out.as_bytes())?;
        outcome.error_log = Some(path);
    }

    Ok(outcome)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), HisdbError> {
    let parent = path
        .parent()
        .ok_or_else(|| HisdbError::Filesystem("invalid destination path".to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".hisdb-stats")
        .tempfile_in(parent)
        .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
    temp.write_all(bytes)
        .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| HisdbError::Filesystem(err.to_string()))?;
    Ok(())
}
