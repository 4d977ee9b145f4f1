//! # Configuration
//!
//! Node settings as the host stores them, and the tunables of a streaming run.
use crate::credentials::CredentialsProvider;
use crate::stream::StreamContext;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Rows requested per page when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Errors in host-provided configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Incomplete configuration, '{field}' is missing")]
    Incomplete { field: &'static str },

    #[error("Invalid page size '{0}', must be at least 1")]
    InvalidPageSize(usize),
}

/// Tunables of a streaming run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamOptions {
    /// Rows per request (default: 100)
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl StreamOptions {
    pub fn page_size(&self) -> Result<usize, ConfigError> {
        match self.page_size.unwrap_or(DEFAULT_PAGE_SIZE) {
            0 => Err(ConfigError::InvalidPageSize(0)),
            page_size => Ok(page_size),
        }
    }
}

/// Node settings as serialized by the host editor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Spreadsheet identifier
    #[serde(default)]
    pub sheet_id: String,
    /// Title of the selected sheet
    #[serde(default)]
    pub sheet_list: String,
    /// A1 range to stream, header row first
    #[serde(default)]
    pub range: String,
    /// Header names to keep in each record
    #[serde(default)]
    pub columns: Vec<String>,
    /// Identifier of the credentials node
    #[serde(default)]
    pub config: String,
    #[serde(flatten)]
    pub options: StreamOptions,
}

impl NodeConfig {
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }

    /// Builds the run context, failing when any setting is empty.
    ///
    /// Nodes dropped into a flow by automation carry no settings; hosts leave such
    /// nodes uninitialised.
    pub fn to_context(
        &self,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<StreamContext, ConfigError> {
        if self.config.trim().is_empty() {
            return Err(ConfigError::Incomplete { field: "config" });
        }
        StreamContext::new(
            &self.sheet_id,
            &self.sheet_list,
            &self.range,
            self.columns.iter().cloned(),
            credentials,
        )
    }
}
