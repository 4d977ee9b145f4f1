//! # Metadata Cache
//!
//! Holds, per spreadsheet, the title, grid dimensions and header row of every sheet.
//! Entries are replaced wholesale on refresh and never patched in place.
use crate::credentials::{Credentials, CredentialsProvider};
use crate::range::{column_letter_from_index, quote_sheet_title};
use crate::source::{SheetKind, SheetProperties, SheetSource};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while resolving sheet metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to obtain credentials: {0}")]
    CredentialsError(#[source] anyhow::Error),

    #[error("Failed to describe spreadsheet '{source_id}': {cause}")]
    DescribeError {
        source_id: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Failed to read header row '{range}': {cause}")]
    HeaderError {
        range: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Sheet '{title}' not found in spreadsheet '{source_id}'")]
    SheetNotFound { source_id: String, title: String },

    #[error("Metadata cache lock poisoned")]
    Poisoned,
}

/// Description of one sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetMetadata {
    pub title: String,
    pub row_count: usize,
    pub column_count: usize,
    pub frozen_row_count: usize,
    #[serde(rename = "sheetType")]
    pub sheet_kind: SheetKind,
    /// First row of the sheet, empty when the sheet has no data
    pub headers: Vec<String>,
    /// Whole grid as an A1 range, e.g. `A1:Z1000`
    pub cells_range: String,
}

impl SheetMetadata {
    fn new(properties: SheetProperties, headers: Vec<String>) -> Self {
        let cells_range = format!(
            "A1:{}{}",
            column_letter_from_index(properties.column_count),
            properties.row_count
        );
        Self {
            title: properties.title,
            row_count: properties.row_count,
            column_count: properties.column_count,
            frozen_row_count: properties.frozen_row_count,
            sheet_kind: properties.sheet_kind,
            headers,
            cells_range,
        }
    }
}

/// Description of one spreadsheet and all of its sheets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpreadsheetMetadata {
    pub title: String,
    pub sheets: Vec<SheetMetadata>,
}

impl SpreadsheetMetadata {
    pub fn sheet(&self, title: &str) -> Option<&SheetMetadata> {
        self.sheets.iter().find(|sheet| sheet.title == title)
    }
}

/// Shared metadata cache keyed by spreadsheet identifier.
///
/// Refreshes of the same spreadsheet are serialized; refreshes of different
/// spreadsheets run independently.
pub struct MetadataCache {
    source: Arc<dyn SheetSource>,
    entries: RwLock<HashMap<String, Arc<SpreadsheetMetadata>>>,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MetadataCache {
    pub fn new(source: Arc<dyn SheetSource>) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached entry for `source_id`, if any.
    pub fn get(&self, source_id: &str) -> Option<Arc<SpreadsheetMetadata>> {
        self.entries.read().ok()?.get(source_id).cloned()
    }

    /// Stores an entry fetched elsewhere, replacing any previous one.
    pub fn insert(&self, source_id: &str, metadata: SpreadsheetMetadata) -> Result<(), MetadataError> {
        self.entries
            .write()
            .map_err(|_| MetadataError::Poisoned)?
            .insert(source_id.to_owned(), Arc::new(metadata));
        Ok(())
    }

    /// Drops the entry for `source_id`.
    pub fn invalidate(&self, source_id: &str) -> Result<(), MetadataError> {
        self.entries
            .write()
            .map_err(|_| MetadataError::Poisoned)?
            .remove(source_id);
        Ok(())
    }

    /// Fetches the description and header row of every sheet and replaces the cache entry.
    pub async fn refresh(
        &self,
        source_id: &str,
        credentials: &Credentials,
    ) -> Result<Arc<SpreadsheetMetadata>, MetadataError> {
        let lock = self.refresh_lock(source_id)?;
        let metadata = {
            let _guard = lock.lock().await;
            self.fetch_metadata(source_id, credentials).await
        };
        self.release_refresh_lock(source_id, lock);
        metadata
    }

    async fn fetch_metadata(
        &self,
        source_id: &str,
        credentials: &Credentials,
    ) -> Result<Arc<SpreadsheetMetadata>, MetadataError> {
        let description = self
            .source
            .describe_source(source_id, credentials)
            .await
            .map_err(|cause| MetadataError::DescribeError {
                source_id: source_id.to_owned(),
                cause,
            })?;

        let sheets = try_join_all(description.sheets.into_iter().map(|properties| async move {
            let range = format!("{}!A1:1", quote_sheet_title(&properties.title));
            let headers = self
                .source
                .fetch_range(source_id, &range)
                .await
                .map_err(|cause| MetadataError::HeaderError {
                    range: range.to_owned(),
                    cause,
                })?
                .values
                .into_iter()
                .next()
                .unwrap_or_default();
            Ok::<_, MetadataError>(SheetMetadata::new(properties, headers))
        }))
        .await?;

        let metadata = Arc::new(SpreadsheetMetadata {
            title: description.title,
            sheets,
        });
        self.entries
            .write()
            .map_err(|_| MetadataError::Poisoned)?
            .insert(source_id.to_owned(), Arc::clone(&metadata));
        info!(source_id, sheets = metadata.sheets.len(), "Refreshed spreadsheet metadata");
        Ok(metadata)
    }

    /// Returns the metadata of sheet `title`, refreshing the cache once on a miss.
    ///
    /// Credentials are only requested from `credentials` when a refresh is needed.
    pub async fn resolve_sheet(
        &self,
        source_id: &str,
        title: &str,
        credentials: &dyn CredentialsProvider,
    ) -> Result<SheetMetadata, MetadataError> {
        if let Some(sheet) = self.get(source_id).as_deref().and_then(|metadata| metadata.sheet(title)) {
            return Ok(sheet.to_owned());
        }

        warn!(source_id, title, "No metadata available, refreshing");
        let credentials = credentials
            .credentials()
            .map_err(MetadataError::CredentialsError)?;
        let metadata = self.refresh(source_id, &credentials).await?;
        metadata
            .sheet(title)
            .cloned()
            .ok_or_else(|| MetadataError::SheetNotFound {
                source_id: source_id.to_owned(),
                title: title.to_owned(),
            })
    }

    fn refresh_lock(&self, source_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, MetadataError> {
        let mut locks = self.refresh_locks.lock().map_err(|_| MetadataError::Poisoned)?;
        Ok(Arc::clone(locks.entry(source_id.to_owned()).or_default()))
    }

    /// Forgets the refresh lock of `source_id` once no other refresh holds or awaits it.
    fn release_refresh_lock(&self, source_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.refresh_locks.lock() else {
            return;
        };
        // Clones are only handed out under `refresh_locks`, so the count cannot grow here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(source_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::{MemorySheet, MemorySource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn credentials() -> Credentials {
        Credentials {
            client_email: "bot@example.iam".to_owned(),
            private_key: "key".to_owned(),
        }
    }

    fn source() -> Arc<MemorySource> {
        Arc::new(MemorySource::new().with_spreadsheet(
            "doc",
            "Budget",
            vec![
                MemorySheet::new("Sheet1", vec![vec!["name", "age"], vec!["Ann", "31"]]).with_grid(1000, 28),
                MemorySheet::new("Blank", Vec::<Vec<String>>::new()).with_grid(10, 3).with_frozen_rows(1),
            ],
        ))
    }

    #[tokio::test]
    async fn refresh_describes_every_sheet() {
        let source = source();
        let cache = MetadataCache::new(source.clone());
        assert!(cache.get("doc").is_none());

        let metadata = cache.refresh("doc", &credentials()).await.unwrap();
        assert_eq!(metadata.title, "Budget");
        assert_eq!(metadata.sheets.len(), 2);

        let sheet = metadata.sheet("Sheet1").unwrap();
        assert_eq!(sheet.headers, vec!["name", "age"]);
        assert_eq!(sheet.cells_range, "A1:AB1000");

        let blank = metadata.sheet("Blank").unwrap();
        assert!(blank.headers.is_empty());
        assert_eq!(blank.cells_range, "A1:C10");
        assert_eq!(blank.frozen_row_count, 1);

        assert_eq!(cache.get("doc").unwrap(), metadata);
        let mut requests = source.requests();
        requests.sort();
        assert_eq!(requests, vec!["Blank!A1:1", "Sheet1!A1:1"]);
    }

    #[tokio::test]
    async fn resolve_uses_cache_without_credentials() {
        let source = source();
        let cache = MetadataCache::new(source.clone());
        cache.refresh("doc", &credentials()).await.unwrap();

        let calls = AtomicUsize::new(0);
        let provider = || -> anyhow::Result<Credentials> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(credentials())
        };
        let sheet = cache.resolve_sheet("doc", "Sheet1", &provider).await.unwrap();
        assert_eq!(sheet.title, "Sheet1");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.describe_calls(), 1);
    }

    #[tokio::test]
    async fn resolve_refreshes_on_miss() {
        let source = source();
        let cache = MetadataCache::new(source.clone());
        let sheet = cache.resolve_sheet("doc", "Blank", &credentials()).await.unwrap();
        assert_eq!(sheet.row_count, 10);
        assert_eq!(source.describe_calls(), 1);
    }

    #[tokio::test]
    async fn resolve_unknown_sheet() {
        let source = source();
        let cache = MetadataCache::new(source.clone());
        let error = cache.resolve_sheet("doc", "Nope", &credentials()).await.unwrap_err();
        assert!(matches!(error, MetadataError::SheetNotFound { .. }));
        assert_eq!(source.describe_calls(), 1);
    }

    #[tokio::test]
    async fn resolve_reports_collaborator_failures() {
        let cache = MetadataCache::new(Arc::new(MemorySource::new().fail_describe()));
        let error = cache.resolve_sheet("doc", "Sheet1", &credentials()).await.unwrap_err();
        assert!(matches!(error, MetadataError::DescribeError { .. }));

        let cache = MetadataCache::new(source());
        let provider = || -> anyhow::Result<Credentials> { Err(anyhow::anyhow!("no gauth node")) };
        let error = cache.resolve_sheet("doc", "Sheet1", &provider).await.unwrap_err();
        assert!(matches!(error, MetadataError::CredentialsError(_)));
    }

    #[tokio::test]
    async fn refresh_replaces_entry() {
        let cache = MetadataCache::new(source());
        cache
            .insert(
                "doc",
                SpreadsheetMetadata {
                    title: "Stale".to_owned(),
                    sheets: vec![],
                },
            )
            .unwrap();
        assert_eq!(cache.get("doc").unwrap().title, "Stale");

        cache.refresh("doc", &credentials()).await.unwrap();
        assert_eq!(cache.get("doc").unwrap().title, "Budget");

        cache.invalidate("doc").unwrap();
        assert!(cache.get("doc").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_of_one_source() {
        let cache = Arc::new(MetadataCache::new(source()));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.refresh("doc", &credentials()).await.map(|m| m.sheets.len()) })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 2);
        }
        assert_eq!(cache.get("doc").unwrap().sheets.len(), 2);
        assert!(cache.refresh_locks.lock().unwrap().is_empty());
    }

    /// Counts `describe_source` calls that are in flight at the same time.
    #[derive(Default)]
    struct CountingSource {
        in_flight: Mutex<HashMap<String, usize>>,
        peak: Mutex<HashMap<String, usize>>,
        in_flight_total: AtomicUsize,
        peak_total: AtomicUsize,
        /// When set, every describe waits here instead of sleeping
        barrier: Option<tokio::sync::Barrier>,
    }

    impl CountingSource {
        fn with_barrier(parties: usize) -> Self {
            Self {
                barrier: Some(tokio::sync::Barrier::new(parties)),
                ..Self::default()
            }
        }

        fn peak(&self, source_id: &str) -> usize {
            self.peak.lock().unwrap().get(source_id).copied().unwrap_or(0)
        }
    }

    #[async_trait::async_trait]
    impl SheetSource for CountingSource {
        async fn describe_source(
            &self,
            source_id: &str,
            _credentials: &Credentials,
        ) -> anyhow::Result<crate::source::SourceDescription> {
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let count = in_flight.entry(source_id.to_owned()).or_default();
                *count += 1;
                let mut peaks = self.peak.lock().unwrap();
                let peak = peaks.entry(source_id.to_owned()).or_default();
                *peak = (*peak).max(*count);
            }
            let total = self.in_flight_total.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_total.fetch_max(total, Ordering::SeqCst);

            match &self.barrier {
                Some(barrier) => {
                    barrier.wait().await;
                }
                None => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }

            self.in_flight_total.fetch_sub(1, Ordering::SeqCst);
            if let Some(count) = self.in_flight.lock().unwrap().get_mut(source_id) {
                *count -= 1;
            }
            Ok(crate::source::SourceDescription {
                title: source_id.to_owned(),
                sheets: vec![],
            })
        }

        async fn fetch_range(&self, _source_id: &str, _range: &str) -> anyhow::Result<crate::source::ValueRange> {
            Ok(crate::source::ValueRange::default())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refreshes_of_one_source_are_serialized() {
        let source = Arc::new(CountingSource::default());
        let cache = Arc::new(MetadataCache::new(source.clone()));
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.refresh("doc", &credentials()).await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(source.peak("doc"), 1);
        assert!(cache.refresh_locks.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refreshes_of_different_sources_overlap() {
        // Each describe waits until both are in flight, so serializing them would hang.
        let source = Arc::new(CountingSource::with_barrier(2));
        let cache = Arc::new(MetadataCache::new(source.clone()));
        let tasks: Vec<_> = ["doc-a", "doc-b"]
            .into_iter()
            .map(|source_id| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.refresh(source_id, &credentials()).await.map(|_| ()) })
            })
            .collect();
        let results = tokio::time::timeout(std::time::Duration::from_secs(5), futures::future::join_all(tasks))
            .await
            .expect("refreshes of different sources waited for each other");
        for result in results {
            result.unwrap().unwrap();
        }
        assert_eq!(source.peak("doc-a"), 1);
        assert_eq!(source.peak("doc-b"), 1);
        assert_eq!(source.peak_total.load(Ordering::SeqCst), 2);
        assert!(cache.get("doc-a").is_some() && cache.get("doc-b").is_some());
    }

    #[test]
    fn serialize_for_preview() {
        let metadata = SpreadsheetMetadata {
            title: "Budget".to_owned(),
            sheets: vec![SheetMetadata::new(
                SheetProperties {
                    title: "Sheet1".to_owned(),
                    row_count: 1000,
                    column_count: 26,
                    frozen_row_count: 0,
                    sheet_kind: SheetKind::Grid,
                },
                vec!["name".to_owned()],
            )],
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["sheets"][0]["cellsRange"], "A1:Z1000");
        assert_eq!(json["sheets"][0]["sheetType"], "GRID");
        assert_eq!(json["sheets"][0]["rowCount"], 1000);
    }
}
