//! Ntuple output.
//!
//! An [`NtupleBook`] is the per-worker output sink. Modules declare an
//! [`NtupleSchema`] once per run; the book creates the ntuple and records
//! which module owns it. Every event, each owner's staged [`OutputRow`] is
//! rewritten in place and then committed as a new row. At end of run the
//! worker books are merged in worker order and written out.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the output sink.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Ntuple id {0} does not exist")]
    UnknownNtuple(usize),

    #[error("Column {column} is out of range for ntuple '{ntuple}' ({width} columns)")]
    ColumnOutOfRange {
        ntuple: String,
        column: usize,
        width: usize,
    },

    #[error("Cannot merge ntuple '{theirs}' into '{ours}': schemas differ")]
    SchemaMismatch { ours: String, theirs: String },

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialisation error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handle to an ntuple inside one [`NtupleBook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtupleId(usize);

impl NtupleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Fixed column layout of an ntuple. All columns hold `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NtupleSchema {
    pub name: String,
    pub title: String,
    pub columns: Vec<String>,
}

impl NtupleSchema {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// The staged row of one ntuple. Always holds a value for every column.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    ntuple: String,
    values: Vec<f64>,
}

impl OutputRow {
    fn for_schema(schema: &NtupleSchema) -> Self {
        Self {
            ntuple: schema.name.clone(),
            values: vec![0.0; schema.width()],
        }
    }

    pub fn set(&mut self, column: usize, value: f64) -> Result<(), OutputError> {
        let width = self.values.len();
        let slot = self
            .values
            .get_mut(column)
            .ok_or_else(|| OutputError::ColumnOutOfRange {
                ntuple: self.ntuple.clone(),
                column,
                width,
            })?;
        *slot = value;
        Ok(())
    }

    pub fn get(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied()
    }

    /// Set every column back to the zero sentinel.
    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// One ntuple: schema, staged row and committed rows.
#[derive(Debug, Clone, Serialize)]
pub struct Ntuple {
    pub schema: NtupleSchema,
    #[serde(skip)]
    current: OutputRow,
    rows: Vec<Vec<f64>>,
}

impl Ntuple {
    fn new(schema: NtupleSchema) -> Self {
        let current = OutputRow::for_schema(&schema);
        Self {
            schema,
            current,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Committed values of `column` by name, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.schema.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    fn staged(&mut self) -> &mut OutputRow {
        &mut self.current
    }
}

/// Per-worker collection of ntuples.
#[derive(Debug, Clone, Default)]
pub struct NtupleBook {
    ntuples: Vec<Ntuple>,
    bindings: IndexMap<String, NtupleId>,
}

impl NtupleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_ntuple(&mut self, schema: NtupleSchema) -> NtupleId {
        let id = NtupleId(self.ntuples.len());
        log::debug!(
            "created ntuple {} '{}' with {} columns",
            id.0,
            schema.name,
            schema.width()
        );
        self.ntuples.push(Ntuple::new(schema));
        id
    }

    /// Record that `owner` fills ntuple `id`.
    pub fn bind(&mut self, owner: &str, id: NtupleId) {
        self.bindings.insert(owner.to_string(), id);
    }

    /// The ntuple owned by `owner`, if it declared one this run.
    pub fn binding(&self, owner: &str) -> Option<NtupleId> {
        self.bindings.get(owner).copied()
    }

    pub fn ntuple(&self, id: NtupleId) -> Result<&Ntuple, OutputError> {
        self.ntuples.get(id.0).ok_or(OutputError::UnknownNtuple(id.0))
    }

    pub fn ntuple_by_name(&self, name: &str) -> Option<&Ntuple> {
        self.ntuples.iter().find(|nt| nt.schema.name == name)
    }

    pub fn ntuples(&self) -> &[Ntuple] {
        &self.ntuples
    }

    /// The staged row of ntuple `id`.
    pub fn row_mut(&mut self, id: NtupleId) -> Result<&mut OutputRow, OutputError> {
        self.ntuples
            .get_mut(id.0)
            .map(Ntuple::staged)
            .ok_or(OutputError::UnknownNtuple(id.0))
    }

    /// Append the staged row of ntuple `id`. The staged values are kept.
    pub fn add_row(&mut self, id: NtupleId) -> Result<(), OutputError> {
        let ntuple = self
            .ntuples
            .get_mut(id.0)
            .ok_or(OutputError::UnknownNtuple(id.0))?;
        let row = ntuple.staged().values().to_vec();
        ntuple.rows.push(row);
        Ok(())
    }

    /// Append the staged row of every bound ntuple.
    pub fn add_bound_rows(&mut self) -> Result<(), OutputError> {
        let ids: Vec<NtupleId> = self.bindings.values().copied().collect();
        for id in ids {
            self.add_row(id)?;
        }
        Ok(())
    }

    /// Append the rows of `other`, ntuple by ntuple. Both books must hold
    /// the same schemas in the same order. An empty book merges trivially.
    pub fn merge(&mut self, other: NtupleBook) -> Result<(), OutputError> {
        if self.ntuples.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.ntuples.is_empty() {
            return Ok(());
        }
        if self.ntuples.len() != other.ntuples.len() {
            return Err(OutputError::SchemaMismatch {
                ours: format!("{} ntuples", self.ntuples.len()),
                theirs: format!("{} ntuples", other.ntuples.len()),
            });
        }
        for (ours, theirs) in self.ntuples.iter().zip(&other.ntuples) {
            if ours.schema != theirs.schema {
                return Err(OutputError::SchemaMismatch {
                    ours: ours.schema.name.clone(),
                    theirs: theirs.schema.name.clone(),
                });
            }
        }
        for (ours, theirs) in self.ntuples.iter_mut().zip(other.ntuples) {
            ours.rows.extend(theirs.rows);
        }
        Ok(())
    }

    /// Write every ntuple next to `base` (extension stripped), one file
    /// per ntuple named `<base>_nt_<ntuple>.<ext>`.
    pub fn write(&self, base: &Path, format: OutputFormat) -> Result<Vec<PathBuf>, OutputError> {
        if let Some(parent) = base.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stem = base.with_extension("");
        let mut written = Vec::with_capacity(self.ntuples.len());
        for ntuple in &self.ntuples {
            let ext = match format {
                OutputFormat::Csv => "csv",
                OutputFormat::Json => "json",
            };
            let path = PathBuf::from(format!(
                "{}_nt_{}.{}",
                stem.display(),
                ntuple.schema.name,
                ext
            ));
            match format {
                OutputFormat::Csv => write_ntuple_csv(ntuple, &path)?,
                OutputFormat::Json => write_ntuple_json(ntuple, &path)?,
            }
            log::info!(
                "ntuple '{}' ({} rows) written to {}",
                ntuple.schema.name,
                ntuple.rows.len(),
                path.display()
            );
            written.push(path);
        }
        Ok(written)
    }
}

/// Write an ntuple as CSV with a `#`-prefixed metadata header.
pub fn write_ntuple_csv(ntuple: &Ntuple, path: &Path) -> Result<(), OutputError> {
    let mut file = BufWriter::new(File::create(path)?);

    writeln!(file, "# BL2 Simulation ntuple output")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# ntuple: {}", ntuple.schema.name)?;
    writeln!(file, "# title: {}", ntuple.schema.title)?;
    writeln!(file, "# rows: {}", ntuple.rows.len())?;
    writeln!(file, "#")?;
    writeln!(file, "{}", ntuple.schema.columns.join(","))?;

    for row in &ntuple.rows {
        let line: Vec<String> = row.iter().map(|v| format!("{:.6e}", v)).collect();
        writeln!(file, "{}", line.join(","))?;
    }
    file.flush()?;
    Ok(())
}

/// Write an ntuple (schema and rows) as pretty-printed JSON.
pub fn write_ntuple_json(ntuple: &Ntuple, path: &Path) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(ntuple)?;
    std::fs::write(path, json)?;
    Ok(())
}
