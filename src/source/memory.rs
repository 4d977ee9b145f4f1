//! In-process [`SheetSource`] backed by row vectors.
//!
//! Behaves like the remote service for range reads: values outside the stored rows are
//! omitted, trailing empty cells and rows are trimmed. Every requested range is recorded
//! so callers can inspect the request sequence.
use crate::credentials::Credentials;
use crate::range::column_index_from_letter;
use crate::source::{SheetKind, SheetProperties, SheetSource, SourceDescription, ValueRange};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One sheet held in memory.
#[derive(Clone, Debug)]
pub struct MemorySheet {
    pub title: String,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
    pub column_count: usize,
    pub frozen_row_count: usize,
    pub sheet_kind: SheetKind,
}

impl MemorySheet {
    /// Creates a sheet whose grid is exactly as large as its data.
    pub fn new<R, C>(title: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            title: title.to_owned(),
            row_count: rows.len(),
            column_count,
            frozen_row_count: 0,
            sheet_kind: SheetKind::Grid,
            rows,
        }
    }

    /// Overrides the grid dimensions reported by `describe_source`.
    pub fn with_grid(mut self, row_count: usize, column_count: usize) -> Self {
        self.row_count = row_count;
        self.column_count = column_count;
        self
    }

    pub fn with_frozen_rows(mut self, frozen_row_count: usize) -> Self {
        self.frozen_row_count = frozen_row_count;
        self
    }
}

#[derive(Clone, Debug)]
struct MemorySpreadsheet {
    title: String,
    sheets: Vec<MemorySheet>,
}

/// In-memory spreadsheet service.
#[derive(Debug, Default)]
pub struct MemorySource {
    spreadsheets: HashMap<String, MemorySpreadsheet>,
    requests: Mutex<Vec<String>>,
    describe_calls: AtomicUsize,
    fail_fetch_at: Option<usize>,
    fail_describe: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a spreadsheet under `source_id`.
    pub fn with_spreadsheet(mut self, source_id: &str, title: &str, sheets: Vec<MemorySheet>) -> Self {
        self.spreadsheets.insert(
            source_id.to_owned(),
            MemorySpreadsheet {
                title: title.to_owned(),
                sheets,
            },
        );
        self
    }

    /// Makes the `n`-th range read (1-based, counted across all reads) fail.
    pub fn fail_fetch_at(mut self, n: usize) -> Self {
        self.fail_fetch_at = Some(n);
        self
    }

    /// Makes every `describe_source` call fail.
    pub fn fail_describe(mut self) -> Self {
        self.fail_describe = true;
        self
    }

    /// Ranges requested through `fetch_range`, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }

    /// Number of `describe_source` calls served so far.
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    fn sheet(&self, source_id: &str, title: &str) -> Result<&MemorySheet> {
        self.spreadsheets
            .get(source_id)
            .ok_or_else(|| anyhow!("Requested entity was not found: '{source_id}'"))?
            .sheets
            .iter()
            .find(|sheet| sheet.title == title)
            .ok_or_else(|| anyhow!("Unable to parse range: sheet '{title}' does not exist"))
    }
}

/// A resolved read window, 0-based and inclusive. `None` upper bounds are open.
struct Window {
    title: String,
    row_lower: usize,
    row_upper: Option<usize>,
    col_lower: usize,
    col_upper: Option<usize>,
}

impl TryFrom<&str> for Window {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        let pattern = Regex::new(r"^(.+)!([A-Z]*)(\d*):([A-Z]*)(\d*)$").expect("Hardcode regex pattern");
        let captures = pattern
            .captures(value)
            .ok_or_else(|| anyhow!("Unable to parse range: {value}"))?;
        let title = captures[1].to_owned();
        let title = match title.strip_prefix('\'').and_then(|title| title.strip_suffix('\'')) {
            Some(quoted) => quoted.replace("''", "'"),
            None => title,
        };
        let column = |index: usize| captures.get(index).and_then(|m| column_index_from_letter(m.as_str())).map(|c| c - 1);
        let row = |index: usize| {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .filter(|row| *row > 0)
                .map(|row| row - 1)
        };
        Ok(Window {
            title,
            row_lower: row(3).unwrap_or(0),
            row_upper: row(5),
            col_lower: column(2).unwrap_or(0),
            col_upper: column(4),
        })
    }
}

#[async_trait]
impl SheetSource for MemorySource {
    async fn describe_source(&self, source_id: &str, credentials: &Credentials) -> Result<SourceDescription> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_describe {
            bail!("The caller does not have permission");
        }
        credentials.validate()?;
        let spreadsheet = self
            .spreadsheets
            .get(source_id)
            .ok_or_else(|| anyhow!("Requested entity was not found: '{source_id}'"))?;
        Ok(SourceDescription {
            title: spreadsheet.title.to_owned(),
            sheets: spreadsheet
                .sheets
                .iter()
                .map(|sheet| SheetProperties {
                    title: sheet.title.to_owned(),
                    row_count: sheet.row_count,
                    column_count: sheet.column_count,
                    frozen_row_count: sheet.frozen_row_count,
                    sheet_kind: sheet.sheet_kind,
                })
                .collect(),
        })
    }

    async fn fetch_range(&self, source_id: &str, range: &str) -> Result<ValueRange> {
        let count = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| anyhow!("Request log poisoned"))?;
            requests.push(range.to_owned());
            requests.len()
        };
        if self.fail_fetch_at == Some(count) {
            bail!("Service unavailable while reading '{range}'");
        }

        let window = Window::try_from(range)?;
        let sheet = self.sheet(source_id, &window.title)?;
        let mut values: Vec<Vec<String>> = sheet
            .rows
            .iter()
            .enumerate()
            .skip(window.row_lower)
            .take_while(|(row, _)| window.row_upper.map(|upper| *row <= upper).unwrap_or(true))
            .map(|(_, cells)| {
                let mut cells: Vec<String> = cells
                    .iter()
                    .enumerate()
                    .skip(window.col_lower)
                    .take_while(|(col, _)| window.col_upper.map(|upper| *col <= upper).unwrap_or(true))
                    .map(|(_, cell)| cell.to_owned())
                    .collect();
                while cells.last().map(String::is_empty).unwrap_or(false) {
                    cells.pop();
                }
                cells
            })
            .collect();
        while values.last().map(Vec::is_empty).unwrap_or(false) {
            values.pop();
        }
        Ok(ValueRange {
            range: Some(range.to_owned()),
            values,
        })
    }
}
