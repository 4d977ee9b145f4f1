use std::collections::{BTreeMap, HashSet};

/// One data row keyed by header name, restricted to the selected columns.
pub type Record = BTreeMap<String, String>;

/// Turns pages of raw rows into records.
///
/// The very first row seen during a run is the header row: it is remembered and never
/// emitted. Later rows, across every page, are keyed by the header at the same index.
#[derive(Debug, Default)]
pub struct RowProjector {
    headers: Option<Vec<String>>,
}

impl RowProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header row captured so far, if any.
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    /// Projects every row of a page into a record.
    pub fn project(&mut self, rows: &[Vec<String>], columns: &HashSet<String>) -> Vec<Record> {
        let mut rows = rows.iter();
        if self.headers.is_none() {
            match rows.next() {
                Some(headers) => self.headers = Some(headers.to_owned()),
                None => return vec![],
            }
        }
        if columns.is_empty() {
            return vec![];
        }
        rows.map(|row| self.project_row(row, columns)).collect()
    }

    fn project_row(&self, row: &[String], columns: &HashSet<String>) -> Record {
        let headers = self.headers.as_deref().unwrap_or_default();
        row.iter()
            .zip(headers)
            .filter(|(_, header)| columns.contains(*header))
            .map(|(value, header)| (header.to_owned(), value.to_owned()))
            .collect()
    }
}
