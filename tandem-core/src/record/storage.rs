//! Storage aggregating records between flushes.
use super::{Record, RecordValue};
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them on demand.
///
/// Scalars stored more than once are reduced to `_min`, `_max`, `_mean` and
/// `_median` entries. For every other value type the most recent value is kept.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn min(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().copied().fold(f32::INFINITY, f32::min))
}

fn max(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().copied().fold(f32::NEG_INFINITY, f32::max))
}

fn mean(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().sum::<f32>() / vs.len() as f32)
}

fn median(mut vs: Vec<f32>) -> RecordValue {
    vs.sort_by(|x, y| x.total_cmp(y));
    RecordValue::Scalar(vs[vs.len() / 2])
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    fn get_keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            for k in record.keys() {
                keys.insert(k.clone());
            }
        }
        keys
    }

    /// Latest value of a key.
    fn latest(&self, key: &str) -> Option<&RecordValue> {
        self.data.iter().rev().find_map(|record| record.get(key))
    }

    fn scalar(&self, key: &str) -> Record {
        let vs: Vec<f32> = self
            .data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect();

        if vs.len() == 1 {
            Record::from_scalar(key, vs[0])
        } else {
            Record::from_slice(&[
                (format!("{}_min", key), min(&vs)),
                (format!("{}_max", key), max(&vs)),
                (format!("{}_mean", key), mean(&vs)),
                (format!("{}_median", key), median(vs)),
            ])
        }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if any stored record has the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.iter().any(|r| r.contains_key(key))
    }

    /// Returns `true` if nothing has been stored since the last aggregation.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Aggregates all stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.get_keys().iter() {
            let r = match self.latest(key) {
                Some(RecordValue::Scalar(..)) => self.scalar(key),
                Some(value) => Record::from_slice(&[(key.as_str(), value.clone())]),
                None => continue,
            };
            record.merge_inplace(r);
        }

        self.data.clear();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_scalars([("score", 1.0), ("fps", 100.0)]));
        storage.store(Record::from_scalar("score", 3.0));
        storage.store(Record::from_scalar("score", 2.0));
        assert!(storage.contains_key("score"));

        let r = storage.aggregate();
        assert_eq!(r.get_scalar("score_min").unwrap(), 1.0);
        assert_eq!(r.get_scalar("score_max").unwrap(), 3.0);
        assert_eq!(r.get_scalar("score_mean").unwrap(), 2.0);
        assert_eq!(r.get_scalar("score_median").unwrap(), 2.0);
        assert_eq!(r.get_scalar("fps").unwrap(), 100.0);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_latest_string_wins() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_slice(&[("model", RecordValue::String("a".into()))]));
        storage.store(Record::from_slice(&[("model", RecordValue::String("b".into()))]));
        assert_eq!(storage.aggregate().get_string("model").unwrap(), "b");
    }
}
