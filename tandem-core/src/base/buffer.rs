//! Buffer contract between data collection and training.
use crate::error::CoreError;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// A transition of a single environment slot.
#[derive(Clone, Debug)]
pub struct RolloutStep<O, A> {
    /// Observation the action was taken on.
    pub obs: O,

    /// Action.
    pub act: A,

    /// Reward.
    pub reward: f32,

    /// Discount.
    pub discount: f32,

    /// Auxiliary terms of the policy for this slot.
    pub terms: HashMap<String, f32>,
}

/// Per-slot transition container filled by a runner and read by a trainer.
///
/// Slots own no state in common. A slot whose episode turned out unusable is
/// discarded with [`TrajectoryBuffer::remove`] and stays invalid until
/// [`TrajectoryBuffer::clear`] or [`TrajectoryBuffer::reset`].
pub trait TrajectoryBuffer<O, A> {
    /// Number of slots.
    fn n_slots(&self) -> usize;

    /// Appends a transition to a slot.
    fn add(&mut self, slot: usize, step: RolloutStep<O, A>) -> Result<(), CoreError>;

    /// Discards the trajectory of a slot.
    fn remove(&mut self, slot: usize);

    /// Returns `true` if the slot has not been discarded.
    fn is_valid_traj(&self, slot: usize) -> bool;

    /// Rewards accumulated in a slot.
    fn rewards(&self, slot: usize) -> Vec<f32>;

    /// Discounts accumulated in a slot.
    fn discounts(&self, slot: usize) -> Vec<f32>;

    /// Replaces the rewards of a slot, e.g. with normalized ones.
    fn update_rewards(&mut self, slot: usize, rewards: &[f32]) -> Result<(), CoreError>;

    /// Closes the trajectories of all valid slots, bootstrapping with
    /// `last_values` (one per slot), and moves them to the ready pool.
    fn finish(&mut self, last_values: &[f32]);

    /// Returns `true` when enough finished data is available for training.
    fn ready(&self) -> bool;

    /// Number of finished transitions.
    fn len(&self) -> usize;

    /// Returns `true` if no finished transition is available.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops unfinished trajectories and revalidates all slots.
    fn clear(&mut self);

    /// Drops everything.
    fn reset(&mut self);
}

/// Read-only view of a buffer for datasets living on other threads.
pub trait DataSource: Send + Sync {
    /// Number of transitions available for training.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is available.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A buffer shared between a collection loop and a trainer's dataset.
pub struct SharedBuffer<B>(Arc<Mutex<B>>);

impl<B> Clone for SharedBuffer<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B> SharedBuffer<B> {
    /// Wraps a buffer.
    pub fn new(buffer: B) -> Self {
        Self(Arc::new(Mutex::new(buffer)))
    }

    /// Runs `f` with exclusive access to the buffer.
    ///
    /// Fails only if a previous holder of the lock panicked.
    pub fn with<T>(&self, f: impl FnOnce(&mut B) -> T) -> anyhow::Result<T> {
        let mut buffer = self
            .0
            .lock()
            .map_err(|_| anyhow::anyhow!("Buffer lock poisoned"))?;
        Ok(f(&mut buffer))
    }
}
