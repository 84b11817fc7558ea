//! File-backed experiment log: `events.log` plus one delimited file per dataset.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, error, warn};

use crate::core::collaborators::ExperimentLog;
use crate::core::invariants::valid_dataset_name;

pub const EVENTS_FILE: &str = "events.log";

struct Dataset {
    columns: Vec<String>,
    pending: BTreeMap<String, String>,
    writer: BufWriter<File>,
    rows: usize,
}

/// Experiment log writing under one output directory.
///
/// The trait methods cannot fail, so I/O errors are kept and surfaced by
/// [`FileLog::finish`].
pub struct FileLog {
    dir: PathBuf,
    delimiter: String,
    events: BufWriter<File>,
    datasets: BTreeMap<String, Dataset>,
    failures: Vec<String>,
}

impl FileLog {
    pub fn open(dir: &Path, delimiter: &str) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
        let events_path = dir.join(EVENTS_FILE);
        let events = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .with_context(|| format!("open {}", events_path.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            delimiter: delimiter.to_string(),
            events: BufWriter::new(events),
            datasets: BTreeMap::new(),
            failures: Vec::new(),
        })
    }

    pub fn dataset_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.csv"))
    }

    /// Datasets still open (begun but not ended).
    pub fn open_datasets(&self) -> Vec<&str> {
        self.datasets.keys().map(String::as_str).collect()
    }

    /// Flush everything and report the first I/O failure, if any.
    pub fn finish(mut self) -> Result<()> {
        let names: Vec<String> = self.datasets.keys().cloned().collect();
        for name in names {
            self.end_dataset(&name);
        }
        if let Err(err) = self.events.flush() {
            self.failures.push(format!("flush {EVENTS_FILE}: {err}"));
        }
        match self.failures.first() {
            None => Ok(()),
            Some(first) => Err(anyhow!(
                "experiment log had {} failure(s), first: {first}",
                self.failures.len()
            )),
        }
    }

    fn event(&mut self, level: &str, tag: &str, message: &str) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(err) = writeln!(self.events, "{stamp} {level} [{tag}] {message}") {
            self.fail(format!("write {EVENTS_FILE}: {err}"));
        }
    }

    fn fail(&mut self, failure: String) {
        error!(failure = %failure, "experiment log failure");
        self.failures.push(failure);
    }

    fn open_dataset(&self, name: &str, columns: &[String]) -> Result<BufWriter<File>> {
        let path = self.dataset_path(name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open dataset {}", path.display()))?;
        let empty = file
            .metadata()
            .with_context(|| format!("stat dataset {}", path.display()))?
            .len()
            == 0;
        if empty {
            writeln!(file, "{}", self.join(columns.iter().map(String::as_str)))
                .with_context(|| format!("write header {}", path.display()))?;
        }
        Ok(BufWriter::new(file))
    }

    fn join<'a>(&self, fields: impl Iterator<Item = &'a str>) -> String {
        fields
            .map(|field| escape_field(field, &self.delimiter))
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }
}

/// Quote a field that contains the delimiter, a quote or a line break.
fn escape_field(field: &str, delimiter: &str) -> String {
    if field.contains(delimiter) || field.contains(['"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl ExperimentLog for FileLog {
    fn info(&mut self, tag: &str, message: &str) {
        self.event("INFO", tag, message);
    }

    fn warn(&mut self, tag: &str, message: &str) {
        self.event("WARN", tag, message);
    }

    fn error(&mut self, tag: &str, message: &str) {
        self.event("ERROR", tag, message);
    }

    fn begin_dataset(&mut self, name: &str, columns: &[String]) {
        if !valid_dataset_name(name) {
            self.fail(format!("invalid dataset name '{name}'"));
            return;
        }
        if self.datasets.contains_key(name) {
            debug!(dataset = name, "dataset already open");
            return;
        }
        match self.open_dataset(name, columns) {
            Ok(writer) => {
                debug!(dataset = name, columns = ?columns, "dataset opened");
                self.datasets.insert(
                    name.to_string(),
                    Dataset {
                        columns: columns.to_vec(),
                        pending: BTreeMap::new(),
                        writer,
                        rows: 0,
                    },
                );
            }
            Err(err) => self.fail(format!("{err:#}")),
        }
    }

    fn set_value(&mut self, name: &str, column: &str, value: &str) {
        match self.datasets.get_mut(name) {
            Some(dataset) if dataset.columns.iter().any(|known| known == column) => {
                dataset.pending.insert(column.to_string(), value.to_string());
            }
            Some(_) => warn!(dataset = name, column, "value for unknown column dropped"),
            None => warn!(dataset = name, column, "value for closed dataset dropped"),
        }
    }

    fn log_row(&mut self, name: &str) {
        let Some(dataset) = self.datasets.get_mut(name) else {
            warn!(dataset = name, "row for closed dataset dropped");
            return;
        };
        let pending = std::mem::take(&mut dataset.pending);
        let fields: Vec<&str> = dataset
            .columns
            .iter()
            .map(|column| pending.get(column).map_or("", String::as_str))
            .collect();
        let line = fields
            .iter()
            .map(|field| escape_field(field, &self.delimiter))
            .collect::<Vec<_>>()
            .join(&self.delimiter);
        dataset.rows += 1;
        if let Err(err) = writeln!(dataset.writer, "{line}") {
            let failure = format!("write dataset {name}: {err}");
            self.fail(failure);
        }
    }

    fn end_dataset(&mut self, name: &str) {
        let Some(mut dataset) = self.datasets.remove(name) else {
            return;
        };
        debug!(dataset = name, rows = dataset.rows, "dataset closed");
        if let Err(err) = dataset.writer.flush() {
            self.fail(format!("flush dataset {name}: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn rows_follow_column_order_with_empty_placeholders() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = FileLog::open(temp.path(), ",").expect("open");

        log.begin_dataset("block", &columns(&["A", "B"]));
        log.set_value("block", "A", "x");
        log.log_row("block");
        log.set_value("block", "B", "z");
        log.set_value("block", "A", "y");
        log.log_row("block");
        log.end_dataset("block");
        log.finish().expect("finish");

        let contents = fs::read_to_string(temp.path().join("block.csv")).expect("read");
        assert_eq!(contents, "A,B\nx,\ny,z\n");
    }

    #[test]
    fn reopening_a_dataset_appends_without_second_header() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = FileLog::open(temp.path(), "\t").expect("open");

        for value in ["1", "2"] {
            log.begin_dataset("trials", &columns(&["rt"]));
            log.set_value("trials", "rt", value);
            log.log_row("trials");
            log.end_dataset("trials");
        }
        log.finish().expect("finish");

        let contents = fs::read_to_string(temp.path().join("trials.csv")).expect("read");
        assert_eq!(contents, "rt\n1\n2\n");
    }

    #[test]
    fn fields_with_delimiters_are_quoted() {
        assert_eq!(escape_field("a,b", ","), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\"", ","), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("plain", ","), "plain");
    }

    #[test]
    fn events_are_timestamped_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = FileLog::open(temp.path(), ",").expect("open");

        log.info("task", "root preparing");
        log.warn("navigation", "clamped");
        log.finish().expect("finish");

        let contents = fs::read_to_string(temp.path().join(EVENTS_FILE)).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" INFO [task] root preparing"));
        assert!(lines[1].ends_with(" WARN [navigation] clamped"));
    }

    #[test]
    fn invalid_dataset_name_surfaces_at_finish() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut log = FileLog::open(temp.path(), ",").expect("open");

        log.begin_dataset("../escape", &columns(&["a"]));
        log.log_row("../escape");

        let err = log.finish().expect_err("invalid name");
        assert!(err.to_string().contains("invalid dataset name"));
        assert!(!temp.path().join("..").join("escape.csv").exists());
    }
}
