//! Objects hosted by workers.
//!
//! Workers never look inside them: they construct them through an
//! [`AlgorithmRegistry`](crate::AlgorithmRegistry), move [`Weights`] in and
//! out, and drive training.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tandem_core::record::Record;

/// Snapshot of named parameter vectors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Weights(BTreeMap<String, Vec<f32>>);

impl Weights {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter vector.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f32>) {
        self.0.insert(name.into(), values);
    }

    /// Returns a parameter vector.
    pub fn get(&self, name: &str) -> Option<&Vec<f32>> {
        self.0.get(name)
    }

    /// Iterates over parameters in name order.
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, String, Vec<f32>> {
        self.0.iter()
    }

    /// Number of parameter vectors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there is no parameter.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<f32>)> for Weights {
    fn from_iter<T: IntoIterator<Item = (K, Vec<f32>)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A parametric model.
pub trait Model: Send {
    /// Returns a copy of the parameters.
    fn get_weights(&self) -> Weights;

    /// Overwrites the parameters.
    fn set_weights(&mut self, weights: Weights) -> Result<()>;
}

/// An inference-only role running a model for data collection.
pub trait ActorRole: Send {
    /// Returns a copy of the parameters.
    fn get_weights(&self) -> Weights;

    /// Overwrites the parameters.
    fn set_weights(&mut self, weights: Weights) -> Result<()>;

    /// Auxiliary statistics, e.g. running normalization moments.
    fn get_auxiliary_stats(&self) -> Record {
        Record::empty()
    }
}

/// Objective optimized by a trainer.
pub trait Loss: Send {
    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Training data as seen by a trainer.
pub trait Dataset: Send {
    /// Returns `true` when enough data is available to start learning.
    fn good_to_learn(&self) -> bool;
}

/// An optimization role.
pub trait TrainerRole: Send {
    /// Returns a copy of the parameters.
    fn get_weights(&self) -> Weights;

    /// Overwrites the parameters.
    fn set_weights(&mut self, weights: Weights) -> Result<()>;

    /// Performs an optimization step on data drawn from `dataset`.
    fn train_record(&mut self, dataset: &mut dyn Dataset) -> Result<Record>;

    /// Number of optimization steps done.
    fn train_step(&self) -> usize;
}
