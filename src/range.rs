//! A1-style range arithmetic.
//!
//! Ranges are written as `<columns><row?>:<columns><row?>`, optionally prefixed with a
//! sheet title (`Sheet1!A1:C50`). Rows and columns are 1-based throughout this module.
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Errors related to A1 range parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid range format '{0}'")]
    FormatError(String),

    #[error("Range '{0}' has no end row, total rows cannot be bounded")]
    Unbounded(String),
}

/// A rectangular selection of cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    /// Starting column letters (e.g. `A`)
    pub start_column: String,
    /// Starting row number, defaults to 1 when omitted
    pub start_row: usize,
    /// Ending column letters
    pub end_column: String,
    /// Ending row number, `None` for an open-ended range such as `A1:C`
    pub end_row: Option<usize>,
}

impl RangeSpec {
    /// Returns the end row, failing for open-ended ranges.
    ///
    /// Paging and progress accounting need a bounded range.
    pub fn bounded_end_row(&self) -> Result<usize, RangeError> {
        self.end_row
            .ok_or_else(|| RangeError::Unbounded(self.to_string()))
    }

    /// Formats a sub-range of this range restricted to the given rows and scoped to a sheet.
    pub fn rows_on_sheet(&self, sheet_title: &str, start_row: usize, end_row: usize) -> String {
        format!(
            "{}!{}{}:{}{}",
            quote_sheet_title(sheet_title),
            self.start_column,
            start_row,
            self.end_column,
            end_row
        )
    }
}

impl TryFrom<&str> for RangeSpec {
    type Error = RangeError;

    /// Parses an A1 range string (e.g. "A1:C3", "A:C10", "Sheet1!B2:D").
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let pattern = Regex::new(r"^(?:.+!)?([A-Z]+)(\d*):([A-Z]+)(\d*)$").expect("Hardcode regex pattern");
        let captures = pattern
            .captures(value)
            .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
        let start_row = match captures.get(2).map(|matcher| matcher.as_str()) {
            Some(row) if !row.is_empty() => {
                parse_row(row).ok_or_else(|| RangeError::FormatError(value.to_owned()))?
            }
            _ => 1,
        };
        let end_row = match captures.get(4).map(|matcher| matcher.as_str()) {
            Some(row) if !row.is_empty() => {
                Some(parse_row(row).ok_or_else(|| RangeError::FormatError(value.to_owned()))?)
            }
            _ => None,
        };
        Ok(RangeSpec {
            start_column: captures[1].to_owned(),
            start_row,
            end_column: captures[3].to_owned(),
            end_row,
        })
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", self.start_column, self.start_row, self.end_column)?;
        if let Some(end_row) = self.end_row {
            write!(f, "{end_row}")?;
        }
        Ok(())
    }
}

/// Parses an A1 range string into a [`RangeSpec`].
pub fn parse_range(value: &str) -> Result<RangeSpec, RangeError> {
    RangeSpec::try_from(value)
}

/// Parses a 1-based row number, rejecting zero.
fn parse_row(number: &str) -> Option<usize> {
    number.parse().ok().filter(|row: &usize| *row > 0)
}

/// Converts a 1-based column number to its column letters.
///
/// A = 1, B = 2, ..., Z = 26, AA = 27, ..., ZZ = 702. Zero yields an empty string.
pub fn column_letter_from_index(index: usize) -> String {
    let mut column = index;
    let mut letters = String::new();
    while column > 0 {
        column -= 1;
        let digit = char::from(b'A' + (column % 26) as u8);
        column /= 26;
        letters.insert(0, digit);
    }
    letters
}

/// Converts column letters to the 1-based column number.
///
/// Returns `None` for an empty string or non-letter characters.
pub fn column_index_from_letter(letters: &str) -> Option<usize> {
    if letters.is_empty() || !letters.bytes().all(|byte| byte.is_ascii_alphabetic()) {
        return None;
    }
    letters
        .to_ascii_uppercase()
        .bytes()
        .map(|byte| (byte - b'A') as usize + 1)
        .try_fold(0usize, |index, digit| index.checked_mul(26)?.checked_add(digit))
}

/// Quotes a sheet title for use in an A1 reference when it contains anything other than
/// letters, digits and underscores.
pub fn quote_sheet_title(title: &str) -> String {
    if !title.is_empty() && title.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        title.to_owned()
    } else {
        format!("'{}'", title.replace('\'', "''"))
    }
}
