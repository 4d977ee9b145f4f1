//! # Remote Source Contracts
//!
//! The streaming engine never talks to a spreadsheet service directly. It is handed a
//! [`SheetSource`], an already-wired client able to describe a spreadsheet and read A1
//! ranges out of it. Authentication, transport and retry policy belong to the
//! implementation.
use crate::credentials::Credentials;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;

/// Values returned by one range read, row-major.
///
/// Trailing empty cells and rows are omitted by the service, so rows can be shorter than
/// the requested width and `values` can be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Effective range reported by the service, if any
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<String>>,
}

/// Kind of a sheet inside a spreadsheet.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SheetKind {
    /// Regular cell grid
    #[default]
    Grid,
    /// Sheet holding a single embedded chart
    Object,
    /// Sheet backed by an external data source
    DataSource,
}

/// Structural properties of one sheet as reported by the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub title: String,
    pub row_count: usize,
    pub column_count: usize,
    #[serde(default)]
    pub frozen_row_count: usize,
    #[serde(default)]
    pub sheet_kind: SheetKind,
}

/// Structural description of a whole spreadsheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescription {
    pub title: String,
    pub sheets: Vec<SheetProperties>,
}

/// Remote spreadsheet service.
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Describes the spreadsheet `source_id`, authenticating with `credentials`.
    async fn describe_source(
        &self,
        source_id: &str,
        credentials: &Credentials,
    ) -> anyhow::Result<SourceDescription>;

    /// Reads a sheet-scoped A1 range such as `Sheet1!A1:C100` or `Sheet1!A1:1`.
    async fn fetch_range(&self, source_id: &str, range: &str) -> anyhow::Result<ValueRange>;
}
