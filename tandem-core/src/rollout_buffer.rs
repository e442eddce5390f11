//! On-policy rollout buffer.
use crate::{
    error::CoreError, DataSource, RolloutStep, SharedBuffer, TrajectoryBuffer,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`RolloutBuffer`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RolloutBufferConfig {
    /// Number of environment slots.
    pub n_envs: usize,

    /// Finished transitions required before [`TrajectoryBuffer::ready`].
    pub batch_size: usize,

    /// Discount factor for returns.
    pub gamma: f32,
}

impl Default for RolloutBufferConfig {
    fn default() -> Self {
        Self {
            n_envs: 1,
            batch_size: 2048,
            gamma: 0.99,
        }
    }
}

impl RolloutBufferConfig {
    /// Sets the number of slots.
    pub fn n_envs(mut self, v: usize) -> Self {
        self.n_envs = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    /// Constructs [`RolloutBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RolloutBufferConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A finished transition with its discounted return.
#[derive(Clone, Debug)]
pub struct RolloutSample<O, A> {
    /// Transition.
    pub step: RolloutStep<O, A>,

    /// Discounted return, bootstrapped at the end of the trajectory.
    pub ret: f32,
}

/// Per-slot trajectories of on-policy rollouts.
pub struct RolloutBuffer<O, A> {
    config: RolloutBufferConfig,
    slots: Vec<Vec<RolloutStep<O, A>>>,
    valid: Vec<bool>,
    finished: Vec<RolloutSample<O, A>>,
}

impl<O, A> RolloutBuffer<O, A> {
    /// Builds an empty buffer.
    pub fn build(config: &RolloutBufferConfig) -> Self {
        Self {
            config: config.clone(),
            slots: (0..config.n_envs).map(|_| vec![]).collect(),
            valid: vec![true; config.n_envs],
            finished: vec![],
        }
    }

    /// Finished transitions.
    pub fn samples(&self) -> &[RolloutSample<O, A>] {
        &self.finished
    }

    /// Takes the finished transitions out of the buffer.
    pub fn drain(&mut self) -> Vec<RolloutSample<O, A>> {
        std::mem::take(&mut self.finished)
    }

    /// Unfinished transitions of a slot.
    pub fn trajectory(&self, slot: usize) -> &[RolloutStep<O, A>] {
        self.slots.get(slot).map(|t| t.as_slice()).unwrap_or(&[])
    }

    fn check_slot(&self, slot: usize) -> Result<(), CoreError> {
        if slot < self.slots.len() {
            Ok(())
        } else {
            Err(CoreError::SlotOutOfRange(slot, self.slots.len()))
        }
    }
}

impl<O, A> TrajectoryBuffer<O, A> for RolloutBuffer<O, A> {
    fn n_slots(&self) -> usize {
        self.slots.len()
    }

    fn add(&mut self, slot: usize, step: RolloutStep<O, A>) -> Result<(), CoreError> {
        self.check_slot(slot)?;
        if !self.valid[slot] {
            return Err(CoreError::InvalidTrajectory(slot));
        }
        self.slots[slot].push(step);
        Ok(())
    }

    fn remove(&mut self, slot: usize) {
        if let Some(traj) = self.slots.get_mut(slot) {
            traj.clear();
            self.valid[slot] = false;
        }
    }

    fn is_valid_traj(&self, slot: usize) -> bool {
        self.valid.get(slot).copied().unwrap_or(false)
    }

    fn rewards(&self, slot: usize) -> Vec<f32> {
        self.trajectory(slot).iter().map(|s| s.reward).collect()
    }

    fn discounts(&self, slot: usize) -> Vec<f32> {
        self.trajectory(slot).iter().map(|s| s.discount).collect()
    }

    fn update_rewards(&mut self, slot: usize, rewards: &[f32]) -> Result<(), CoreError> {
        self.check_slot(slot)?;
        let traj = &mut self.slots[slot];
        if traj.len() != rewards.len() {
            return Err(CoreError::BatchSizeMismatch(format!(
                "slot {} holds {} steps, got {} rewards",
                slot,
                traj.len(),
                rewards.len()
            )));
        }
        for (s, &r) in traj.iter_mut().zip(rewards) {
            s.reward = r;
        }
        Ok(())
    }

    fn finish(&mut self, last_values: &[f32]) {
        let gamma = self.config.gamma;
        for (slot, traj) in self.slots.iter_mut().enumerate() {
            if !self.valid[slot] || traj.is_empty() {
                traj.clear();
                continue;
            }
            let mut ret = last_values.get(slot).copied().unwrap_or(0.0);
            let mut samples: Vec<_> = traj
                .drain(..)
                .rev()
                .map(|step| {
                    ret = step.reward + gamma * step.discount * ret;
                    RolloutSample { step, ret }
                })
                .collect();
            samples.reverse();
            self.finished.extend(samples);
        }
    }

    fn ready(&self) -> bool {
        self.finished.len() >= self.config.batch_size
    }

    fn len(&self) -> usize {
        self.finished.len()
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|t| t.clear());
        self.valid.iter_mut().for_each(|v| *v = true);
    }

    fn reset(&mut self) {
        self.clear();
        self.finished.clear();
    }
}

impl<O: Send, A: Send> DataSource for SharedBuffer<RolloutBuffer<O, A>> {
    fn len(&self) -> usize {
        self.with(|b| b.len()).unwrap_or(0)
    }
}
