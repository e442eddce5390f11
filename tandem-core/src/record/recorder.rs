use super::Record;

/// Writes a record to an output destination.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);
}

/// A [`Recorder`] that aggregates stored records before writing them.
///
/// This is the statistics collaborator of the collect/train cycle:
/// `store` receives named scalars, `flush` writes their aggregate at a step.
pub trait AggregateRecorder {
    /// Stores a record for later aggregation.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records at the given step.
    fn flush(&mut self, step: i64);

    /// Returns `true` if a stored, not yet flushed record has the key.
    fn contains_key(&self, key: &str) -> bool;
}
