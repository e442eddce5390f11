//! Running aggregation of records.
use super::{Record, RecordValue};
use std::collections::HashMap;
use xxhash_rust::xxh3::Xxh3Builder;

#[derive(Clone, Copy, Debug)]
struct ScalarSummary {
    n: usize,
    min: f32,
    max: f32,
    sum: f64,
}

impl ScalarSummary {
    fn new(v: f32) -> Self {
        Self {
            n: 1,
            min: v,
            max: v,
            sum: v as f64,
        }
    }

    fn push(&mut self, v: f32) {
        self.n += 1;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sum += v as f64;
    }
}

/// Folds records into running statistics as they arrive.
///
/// Unlike [`RecordStorage`](super::RecordStorage) no record is kept, so memory
/// depends on the number of keys only. Scalars stored more than once are
/// reduced to `_min`, `_max` and `_mean` entries; a scalar stored once keeps
/// its key. For every other value type the most recent value is kept.
#[derive(Default)]
pub struct RecordSummary {
    scalars: HashMap<String, ScalarSummary, Xxh3Builder>,
    latest: HashMap<String, RecordValue, Xxh3Builder>,
}

impl RecordSummary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a record into the summary.
    pub fn store(&mut self, record: Record) {
        for (k, v) in record.into_iter_in_record() {
            match v {
                RecordValue::Scalar(v) => {
                    self.latest.remove(&k);
                    match self.scalars.get_mut(&k) {
                        Some(s) => s.push(v),
                        None => {
                            self.scalars.insert(k, ScalarSummary::new(v));
                        }
                    }
                }
                value => {
                    self.scalars.remove(&k);
                    self.latest.insert(k, value);
                }
            }
        }
    }

    /// Returns `true` if any folded record had the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.scalars.contains_key(key) || self.latest.contains_key(key)
    }

    /// Returns `true` if nothing has been stored since the last aggregation.
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.latest.is_empty()
    }

    /// Returns the statistics folded so far and clears the summary.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for (key, s) in self.scalars.drain() {
            if s.n == 1 {
                record.insert(key, RecordValue::Scalar(s.min));
            } else {
                let mean = (s.sum / s.n as f64) as f32;
                record.insert(format!("{}_min", key), RecordValue::Scalar(s.min));
                record.insert(format!("{}_max", key), RecordValue::Scalar(s.max));
                record.insert(format!("{}_mean", key), RecordValue::Scalar(mean));
            }
        }
        for (key, value) in self.latest.drain() {
            record.insert(key, value);
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_scalars() {
        let mut summary = RecordSummary::new();
        for i in 1..=100 {
            summary.store(Record::from_scalars([("loss", 1.0 / i as f32), ("n", 4.0)]));
        }
        summary.store(Record::from_scalar("lr", 0.1));
        assert!(summary.contains_key("loss"));

        let r = summary.aggregate();
        assert_eq!(r.get_scalar("loss_min").unwrap(), 0.01);
        assert_eq!(r.get_scalar("loss_max").unwrap(), 1.0);
        assert_eq!(r.get_scalar("n_mean").unwrap(), 4.0);
        assert_eq!(r.get_scalar("lr").unwrap(), 0.1);
        assert!(!r.contains_key("loss_median"));
        assert!(summary.is_empty());
    }

    #[test]
    fn test_latest_value_wins() {
        let mut summary = RecordSummary::new();
        summary.store(Record::from_scalar("phase", 1.0));
        summary.store(Record::from_slice(&[("phase", RecordValue::String("warmup".into()))]));
        summary.store(Record::from_slice(&[("phase", RecordValue::String("train".into()))]));

        let r = summary.aggregate();
        assert_eq!(r.get_string("phase").unwrap(), "train");
        assert_eq!(r.len(), 1);
    }
}
