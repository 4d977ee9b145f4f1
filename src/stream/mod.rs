//! # Streaming Controller
//!
//! Drives one run: resolves the sheet, pulls pages, projects rows into records and hands
//! them to a sink one at a time. Cancellation is polled before every record, so no record
//! is delivered once a stop has been observed. A page request already in flight is
//! allowed to finish.
use crate::config::{ConfigError, StreamOptions};
use crate::credentials::CredentialsProvider;
use crate::error::StreamError;
use crate::metadata::MetadataCache;
use crate::range::RangeSpec;
use crate::source::SheetSource;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod pager;
pub mod progress;
pub mod projector;

use pager::PageFetcher;
use projector::{Record, RowProjector};

/// Everything one streaming run needs to know about its target.
#[derive(Clone)]
pub struct StreamContext {
    source_id: String,
    sheet_title: String,
    range: String,
    columns: HashSet<String>,
    credentials: Arc<dyn CredentialsProvider>,
}

impl StreamContext {
    pub fn new<C>(
        source_id: &str,
        sheet_title: &str,
        range: &str,
        columns: C,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, ConfigError>
    where
        C: IntoIterator<Item = String>,
    {
        for (field, value) in [("sheetId", source_id), ("sheetList", sheet_title), ("range", range)] {
            if value.trim().is_empty() {
                return Err(ConfigError::Incomplete { field });
            }
        }
        Ok(Self {
            source_id: source_id.to_owned(),
            sheet_title: sheet_title.to_owned(),
            range: range.to_owned(),
            columns: columns.into_iter().collect(),
            credentials,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn sheet_title(&self) -> &str {
        &self.sheet_title
    }

    pub fn range(&self) -> &str {
        &self.range
    }

    pub fn columns(&self) -> &HashSet<String> {
        &self.columns
    }

    pub fn credentials(&self) -> &dyn CredentialsProvider {
        self.credentials.as_ref()
    }
}

impl fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamContext")
            .field("source_id", &self.source_id)
            .field("sheet_title", &self.sheet_title)
            .field("range", &self.range)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Consumer of records, called once per record in row order.
///
/// Returning an error ends the run.
pub trait RecordSink: Send {
    fn accept(&mut self, record: Record) -> anyhow::Result<()>;
}

impl<F> RecordSink for F
where
    F: FnMut(Record) -> anyhow::Result<()> + Send,
{
    fn accept(&mut self, record: Record) -> anyhow::Result<()> {
        self(record)
    }
}

impl RecordSink for Vec<Record> {
    fn accept(&mut self, record: Record) -> anyhow::Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Polled before every record to learn whether the run should stop.
pub trait CancellationProbe: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl CancellationProbe for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl CancellationProbe for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

impl<T: CancellationProbe + ?Sized> CancellationProbe for Arc<T> {
    fn is_cancelled(&self) -> bool {
        self.as_ref().is_cancelled()
    }
}

/// Terminal outcome of a run. `records` counts the records delivered to the sink.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The page sequence was exhausted
    Completed { records: usize },
    /// A cancellation request was observed before the next record
    Stopped { records: usize },
    /// The run failed; records delivered before the failure stay delivered
    Failed { records: usize, error: StreamError },
}

impl StreamOutcome {
    pub fn records(&self) -> usize {
        match self {
            Self::Completed { records } | Self::Stopped { records } | Self::Failed { records, .. } => *records,
        }
    }

    pub fn error(&self) -> Option<&StreamError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Streams sheet ranges as records.
pub struct SheetStreamer {
    source: Arc<dyn SheetSource>,
    metadata: Arc<MetadataCache>,
    options: StreamOptions,
}

impl SheetStreamer {
    /// Creates a streamer sharing an existing metadata cache.
    pub fn new(source: Arc<dyn SheetSource>, metadata: Arc<MetadataCache>, options: StreamOptions) -> Self {
        Self {
            source,
            metadata,
            options,
        }
    }

    /// Creates a streamer with its own metadata cache.
    pub fn with_source(source: Arc<dyn SheetSource>, options: StreamOptions) -> Self {
        let metadata = Arc::new(MetadataCache::new(Arc::clone(&source)));
        Self::new(source, metadata, options)
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    /// Runs one stream to completion, cancellation or failure.
    pub async fn run(
        &self,
        context: &StreamContext,
        sink: &mut dyn RecordSink,
        cancellation: &dyn CancellationProbe,
    ) -> StreamOutcome {
        let mut records = 0;
        match self.stream(context, sink, cancellation, &mut records).await {
            Ok(true) => {
                info!(source_id = context.source_id(), range = context.range(), records, "Stream stopped");
                StreamOutcome::Stopped { records }
            }
            Ok(false) => {
                info!(source_id = context.source_id(), range = context.range(), records, "Stream completed");
                StreamOutcome::Completed { records }
            }
            Err(error) => {
                warn!(source_id = context.source_id(), range = context.range(), records, error = %error, "Stream failed");
                StreamOutcome::Failed { records, error }
            }
        }
    }

    /// Returns whether the run was stopped.
    async fn stream(
        &self,
        context: &StreamContext,
        sink: &mut dyn RecordSink,
        cancellation: &dyn CancellationProbe,
        records: &mut usize,
    ) -> Result<bool, StreamError> {
        let page_size = self.options.page_size()?;
        let range = RangeSpec::try_from(context.range())?;
        let end_row = range.bounded_end_row()?;

        let sheet = self
            .metadata
            .resolve_sheet(context.source_id(), context.sheet_title(), context.credentials())
            .await?;

        let mut pages = PageFetcher::new(
            Arc::clone(&self.source),
            context.source_id(),
            &sheet.title,
            range,
            end_row,
            page_size,
        );
        let mut projector = RowProjector::new();
        while let Some(page) = pages.next_page().await.map_err(StreamError::FetchFailure)? {
            for record in projector.project(page.rows(), context.columns()) {
                if cancellation.is_cancelled() {
                    return Ok(true);
                }
                sink.accept(record).map_err(StreamError::SinkRejected)?;
                *records += 1;
            }
        }
        Ok(false)
    }
}
