//! Writes tandem records to TensorBoard event files.
use log::{debug, warn};
use std::path::Path;
use tandem_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use tensorboard_rs::summary_writer::SummaryWriter;

/// Writes records to TFRecord event files.
///
/// Scalars become scalar summaries. Other values are skipped.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Constructs a [`TensorboardRecorder`] writing into `logdir`.
    ///
    /// Records passed to [`Recorder::write`] carry their step under
    /// `"train_step"`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "train_step".to_string(),
            storage: RecordStorage::new(),
        }
    }

    /// Sets the key holding the step of written records.
    pub fn step_key(mut self, v: impl Into<String>) -> Self {
        self.step_key = v.into();
        self
    }

    fn write_at(&mut self, record: &Record, step: usize) {
        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                _ => debug!("Skipped unsupported value of {}", k),
            }
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes a record at the step stored under the step key.
    ///
    /// Records without a scalar step, or with a negative or non-finite one,
    /// are dropped with a warning.
    fn write(&mut self, record: Record) {
        let step = match record.get(&self.step_key) {
            Some(RecordValue::Scalar(v)) if v.is_finite() && *v >= 0.0 => *v as usize,
            Some(RecordValue::Scalar(v)) => {
                warn!("Record with invalid step {} is not written", v);
                return;
            }
            _ => {
                warn!("Record without scalar '{}' is not written", self.step_key);
                return;
            }
        };
        self.write_at(&record, step);
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    /// Writes the aggregate of stored records at `step`.
    ///
    /// Stored records are discarded with a warning if `step` is negative.
    fn flush(&mut self, step: i64) {
        let record = self.storage.aggregate();
        match usize::try_from(step) {
            Ok(step) => {
                self.write_at(&record, step);
                self.writer.flush();
            }
            Err(_) => warn!("Aggregate at negative step {} is not written", step),
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }
}
