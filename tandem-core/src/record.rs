//! Records of training statistics and the recorders consuming them.
//!
//! * [`Record`] - named values of various types
//! * [`RecordStorage`] - aggregation of stored records (min, max, mean, median)
//! * [`RecordSummary`] - running aggregation (min, max, mean) keeping no record
//! * [`Recorder`] / [`AggregateRecorder`] - destinations of records
//! * [`BufferedRecorder`] - keeps records in memory
mod base;
mod buffered_recorder;
mod recorder;
mod storage;
mod summary;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
pub use summary::RecordSummary;
