//! Agent.
use super::{Env, EnvOutput, Policy};
use crate::record::Record;
use anyhow::Result;

/// A trainable policy driven by the collect/train cycle.
///
/// Parameter updates, value estimates and running statistics are computed by
/// the implementor; the cycle only decides when each of them happens.
pub trait Agent<E: Env, B>: Policy<E> {
    /// Performs one optimization pass on the data in `buffer` and returns
    /// training statistics.
    fn train_record(&mut self, buffer: &mut B) -> Result<Record>;

    /// Number of optimization steps done so far.
    fn train_step(&self) -> usize;

    /// Environment steps recorded with [`Agent::set_env_step`].
    fn env_step(&self) -> usize;

    /// Records the number of environment steps.
    fn set_env_step(&mut self, step: usize);

    /// Returns `true` if observations are normalized with running statistics.
    fn is_obs_normalized(&self) -> bool {
        false
    }

    /// Updates running statistics of observations.
    fn update_obs_rms(&mut self, _obs: &[E::Obs]) {}

    /// Updates running statistics of rewards.
    fn update_reward_rms(&mut self, reward: &[f32], discount: &[f32]);

    /// Normalizes rewards with the running statistics.
    fn normalize_reward(&self, reward: &[f32]) -> Vec<f32>;

    /// Keeps the last valid output of each environment for value estimation.
    fn record_inputs_to_vf(&mut self, last_output: &EnvOutput<E::Obs>);

    /// Value estimates for the inputs given to [`Agent::record_inputs_to_vf`],
    /// one per environment.
    fn compute_value(&mut self) -> Vec<f32>;

    /// Saves a checkpoint.
    fn save(&mut self) -> Result<()>;
}
