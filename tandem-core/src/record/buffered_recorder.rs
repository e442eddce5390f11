use super::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};

/// Keeps written records in memory.
///
/// Records stored with [`AggregateRecorder::store`] are aggregated on
/// [`AggregateRecorder::flush`] and the aggregate, tagged with `"step"`, is
/// appended to the written records. Used in tests and for short runs whose
/// statistics are inspected afterwards.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: RecordStorage,
}

impl BufferedRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Number of written records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no record has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}

impl AggregateRecorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let mut record = self.storage.aggregate();
        record.insert("step", RecordValue::Scalar(step as f32));
        self.write(record);
    }

    fn contains_key(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_writes_aggregate() {
        let mut recorder = BufferedRecorder::new();
        recorder.store(Record::from_scalar("score", 1.0));
        recorder.store(Record::from_scalar("score", 3.0));
        assert!(recorder.contains_key("score"));
        recorder.flush(42);
        assert!(!recorder.contains_key("score"));

        let written = recorder.iter().next().unwrap();
        assert_eq!(written.get_scalar("step").unwrap(), 42.0);
        assert_eq!(written.get_scalar("score_mean").unwrap(), 2.0);
    }
}
