//! # Sheet Stream
//!
//! Streams the rows of a spreadsheet range as one record per row, keyed by the header row.
//!
//! ## Features
//!
//! - **Paged reads**: Rows are fetched in fixed-size pages (100 by default) so large sheets
//!   never have to fit in one response
//! - **Header projection**: The first row of the range names the fields, and each record keeps
//!   only the selected columns
//! - **Metadata cache**: Sheet titles, dimensions and headers are cached per spreadsheet and
//!   refreshed on a miss
//! - **Cooperative cancellation**: A running stream stops before the next record once a stop is
//!   requested
//! - **Progress reporting**: Consumed rows are counted against the size of the range
//!
//! ## Layout
//!
//! - [`range`]: A1 range parsing and column letter conversion
//! - [`source`]: The [`SheetSource`] seam to the remote service, plus an in-memory source
//! - [`metadata`]: The per-spreadsheet [`MetadataCache`]
//! - [`stream`]: Pager, projector, progress tracker and the [`SheetStreamer`] controller
//! - [`node`]: The host-facing [`StreamNode`] with start/stop toggle semantics
pub mod config;
pub mod credentials;
pub mod error;
pub mod metadata;
pub mod node;
pub mod range;
pub mod source;
pub mod stream;

pub use config::{NodeConfig, StreamOptions};
pub use credentials::{Credentials, CredentialsProvider};
pub use error::{ErrorKind, StreamError};
pub use metadata::{MetadataCache, SheetMetadata, SpreadsheetMetadata};
pub use node::{ProcessingState, StreamNode, TriggerOutcome};
pub use range::RangeSpec;
pub use source::SheetSource;
pub use stream::progress::{ProgressObserver, ProgressReport, StatusColor, StopReport};
pub use stream::projector::Record;
pub use stream::{CancellationProbe, RecordSink, SheetStreamer, StreamContext, StreamOutcome};
