use crate::range::RangeSpec;
use crate::source::{SheetSource, ValueRange};
use std::sync::Arc;
use tracing::debug;

/// Reads a bounded range page by page.
///
/// Each call to [`PageFetcher::next_page`] issues exactly one request; nothing is fetched
/// ahead. The sequence ends after a short page or once the cursor passes the end row.
/// A fetcher cannot be rewound, make a new one to read the range again.
pub struct PageFetcher {
    source: Arc<dyn SheetSource>,
    source_id: String,
    sheet_title: String,
    range: RangeSpec,
    end_row: usize,
    page_size: usize,
    /// Next row to request (1-based)
    row_cursor: usize,
    finished: bool,
}

/// One fetched page along with the rows it was requested for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// First requested row (1-based, inclusive)
    pub row_lower: usize,
    /// Last requested row (1-based, inclusive)
    pub row_upper: usize,
    pub values: ValueRange,
}

impl Page {
    pub fn rows(&self) -> &[Vec<String>] {
        &self.values.values
    }
}

impl PageFetcher {
    /// `end_row` is the bounded end of `range`, see [`RangeSpec::bounded_end_row`].
    pub fn new(
        source: Arc<dyn SheetSource>,
        source_id: &str,
        sheet_title: &str,
        range: RangeSpec,
        end_row: usize,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            source_id: source_id.to_owned(),
            sheet_title: sheet_title.to_owned(),
            row_cursor: range.start_row,
            range,
            end_row,
            page_size: page_size.max(1),
            finished: false,
        }
    }

    /// Fetches the next page, or returns `None` when the range is exhausted.
    pub async fn next_page(&mut self) -> anyhow::Result<Option<Page>> {
        if self.finished || self.row_cursor > self.end_row {
            self.finished = true;
            return Ok(None);
        }

        let row_lower = self.row_cursor;
        let row_upper = self.end_row.min(row_lower.saturating_add(self.page_size - 1));
        let range = self.range.rows_on_sheet(&self.sheet_title, row_lower, row_upper);
        // Advance before inspecting the result so an empty page can never repeat.
        match row_lower.checked_add(self.page_size) {
            Some(row_cursor) => self.row_cursor = row_cursor,
            None => self.finished = true,
        }

        let values = match self.source.fetch_range(&self.source_id, &range).await {
            Ok(values) => values,
            Err(error) => {
                self.finished = true;
                return Err(error.context(format!("Failed to fetch '{range}'")));
            }
        };
        debug!(range = %range, rows = values.values.len(), "Fetched page");
        if values.values.len() < self.page_size {
            self.finished = true;
        }
        Ok(Some(Page {
            row_lower,
            row_upper,
            values,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::parse_range;
    use crate::source::memory::{MemorySheet, MemorySource};

    fn rows(data_rows: usize) -> Vec<Vec<String>> {
        std::iter::once(vec!["id".to_owned()])
            .chain((1..=data_rows).map(|row| vec![row.to_string()]))
            .collect()
    }

    fn fetcher(source: &Arc<MemorySource>, range: &str, page_size: usize) -> PageFetcher {
        let range = parse_range(range).unwrap();
        let end_row = range.bounded_end_row().unwrap();
        PageFetcher::new(source.clone(), "doc", "Sheet1", range, end_row, page_size)
    }

    async fn collect(fetcher: &mut PageFetcher) -> Vec<Page> {
        let mut pages = vec![];
        while let Some(page) = fetcher.next_page().await.unwrap() {
            pages.push(page);
        }
        pages
    }

    #[tokio::test]
    async fn single_short_page() {
        let source = Arc::new(MemorySource::new().with_spreadsheet(
            "doc",
            "Doc",
            vec![MemorySheet::new("Sheet1", vec![vec!["a", "b"], vec!["1", "2"], vec!["3", "4"]])],
        ));
        let pages = collect(&mut fetcher(&source, "A1:B3", 100)).await;
        assert_eq!(pages.len(), 1);
        assert_eq!((pages[0].row_lower, pages[0].row_upper), (1, 3));
        assert_eq!(pages[0].rows().len(), 3);
        assert_eq!(source.requests(), vec!["Sheet1!A1:B3"]);
    }

    #[tokio::test]
    async fn pages_over_header_and_250_rows() {
        let source = Arc::new(MemorySource::new().with_spreadsheet("doc", "Doc", vec![MemorySheet::new("Sheet1", rows(250))]));
        let pages = collect(&mut fetcher(&source, "A1:A251", 100)).await;
        let windows: Vec<_> = pages.iter().map(|page| (page.row_lower, page.row_upper, page.rows().len())).collect();
        assert_eq!(windows, vec![(1, 100, 100), (101, 200, 100), (201, 251, 51)]);
        assert_eq!(
            source.requests(),
            vec!["Sheet1!A1:A100", "Sheet1!A101:A200", "Sheet1!A201:A251"]
        );
    }

    #[tokio::test]
    async fn stops_at_end_row_on_full_pages() {
        let source = Arc::new(MemorySource::new().with_spreadsheet("doc", "Doc", vec![MemorySheet::new("Sheet1", rows(500))]));
        let pages = collect(&mut fetcher(&source, "A1:A200", 100)).await;
        assert_eq!(pages.len(), 2);
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn empty_page_ends_sequence() {
        // Header plus 199 rows fills exactly two pages, the third request comes back empty.
        let source = Arc::new(MemorySource::new().with_spreadsheet("doc", "Doc", vec![MemorySheet::new("Sheet1", rows(199))]));
        let mut pages_fetcher = fetcher(&source, "A1:A1000", 100);
        let pages = collect(&mut pages_fetcher).await;
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].rows().len(), 100);
        assert!(pages[2].rows().is_empty());
        assert!(pages_fetcher.next_page().await.unwrap().is_none());
        assert_eq!(source.requests().len(), 3);
    }

    #[tokio::test]
    async fn starts_at_range_start_row() {
        let rows: Vec<Vec<String>> = (0..10)
            .map(|row| vec![row.to_string(), format!("b{row}"), format!("c{row}")])
            .collect();
        let source = Arc::new(MemorySource::new().with_spreadsheet("doc", "Doc", vec![MemorySheet::new("Sheet 2", rows)]));
        let range = parse_range("B5:C9").unwrap();
        let mut pages_fetcher = PageFetcher::new(source.clone(), "doc", "Sheet 2", range, 9, 3);
        let pages = collect(&mut pages_fetcher).await;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].rows()[0], vec!["b4", "c4"]);
        assert_eq!(source.requests(), vec!["'Sheet 2'!B5:C7", "'Sheet 2'!B8:C9"]);
        assert!(pages_fetcher.next_page().await.unwrap().is_none());
    }

    /// Returns the same number of rows for every read.
    struct FixedSource {
        rows: usize,
    }

    #[async_trait::async_trait]
    impl SheetSource for FixedSource {
        async fn describe_source(
            &self,
            _source_id: &str,
            _credentials: &crate::credentials::Credentials,
        ) -> anyhow::Result<crate::source::SourceDescription> {
            anyhow::bail!("not supported")
        }

        async fn fetch_range(&self, _source_id: &str, range: &str) -> anyhow::Result<ValueRange> {
            Ok(ValueRange {
                range: Some(range.to_owned()),
                values: vec![vec!["x".to_owned()]; self.rows],
            })
        }
    }

    #[tokio::test]
    async fn rows_near_usize_max_end_sequence() {
        let range = RangeSpec {
            start_column: "A".to_owned(),
            start_row: usize::MAX - 15,
            end_column: "A".to_owned(),
            end_row: Some(usize::MAX),
        };
        let mut fetcher = PageFetcher::new(Arc::new(FixedSource { rows: 16 }), "doc", "Sheet1", range, usize::MAX, 16);
        let page = fetcher.next_page().await.unwrap().unwrap();
        assert_eq!((page.row_lower, page.row_upper), (usize::MAX - 15, usize::MAX));
        assert_eq!(page.values.range, Some(format!("Sheet1!A{}:A{}", usize::MAX - 15, usize::MAX)));
        assert!(fetcher.next_page().await.unwrap().is_none());

        let range = parse_range("A2:A5").unwrap();
        let mut fetcher = PageFetcher::new(Arc::new(FixedSource { rows: 4 }), "doc", "Sheet1", range, 5, usize::MAX);
        let page = fetcher.next_page().await.unwrap().unwrap();
        assert_eq!((page.row_lower, page.row_upper), (2, 5));
        assert!(fetcher.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_failure_ends_sequence() {
        let source = Arc::new(
            MemorySource::new()
                .with_spreadsheet("doc", "Doc", vec![MemorySheet::new("Sheet1", rows(250))])
                .fail_fetch_at(2),
        );
        let mut fetcher = fetcher(&source, "A1:A251", 100);
        assert!(fetcher.next_page().await.unwrap().is_some());
        let error = fetcher.next_page().await.unwrap_err();
        assert!(error.to_string().contains("Sheet1!A101:A200"));
        assert!(fetcher.next_page().await.unwrap().is_none());
    }
}
