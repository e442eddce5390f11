//! Environment.
use super::{Act, EnvOutput, Obs};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Arity of an environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvType {
    /// A single environment; batches have one row.
    Single,

    /// `n_envs` environments stepped together.
    Vectorized,
}

/// Per-environment information about the current step and episode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EpisodeInfo {
    /// Episode score, present once the environment reports it.
    pub score: Option<f32>,

    /// Episode length in steps.
    pub epslen: Option<usize>,

    /// The episode is really over, not just a life lost.
    pub game_over: bool,

    /// The last transition can be used for training.
    pub valid_step: bool,

    /// The episode is unusable, e.g. truncated in the middle of a reset.
    pub bad_episode: bool,

    /// Win flag for competitive environments.
    pub won: Option<bool>,
}

/// Represents an environment, possibly vectorized over `n_envs` copies.
///
/// Environments reset themselves automatically: when `reset[i]` is set in an
/// [`EnvOutput`], row `i` of its observation is the first of a new episode.
pub trait Env {
    /// Observation batch.
    type Obs: Obs;

    /// Action batch.
    type Act: Act;

    /// Single or vectorized.
    fn env_type(&self) -> EnvType;

    /// Number of environments.
    fn n_envs(&self) -> usize;

    /// Step bound of an episode, `None` if the environment does not set one.
    fn max_episode_steps(&self) -> Option<usize>;

    /// Simulator ticks one action is held for.
    fn frame_skip(&self) -> usize {
        1
    }

    /// Performs an environment step.
    ///
    /// `frame_skip`, if given, overrides [`Env::frame_skip`] per environment.
    fn step(
        &mut self,
        act: &Self::Act,
        frame_skip: Option<&[usize]>,
    ) -> Result<EnvOutput<Self::Obs>>;

    /// Resets the environments at `idxes`, or all of them on `None`.
    ///
    /// The returned output has one row per reset environment.
    fn reset(&mut self, idxes: Option<&[usize]>) -> Result<EnvOutput<Self::Obs>>;

    /// The latest output of all environments.
    fn output(&self) -> EnvOutput<Self::Obs>;

    /// Scores of the current or last finished episodes.
    fn score(&self, idxes: Option<&[usize]>) -> Vec<f32>;

    /// Lengths of the current or last finished episodes.
    fn epslen(&self, idxes: Option<&[usize]>) -> Vec<usize>;

    /// Step information.
    fn info(&self, idxes: Option<&[usize]>) -> Vec<EpisodeInfo>;

    /// Game-over flags, one per environment.
    fn game_over(&self) -> Vec<bool>;
}

/// Environments able to sample random actions.
pub trait RandomAction: Env {
    /// A uniformly random action batch.
    fn random_action(&mut self) -> Self::Act;
}

/// Environments able to render frames.
pub trait Screen: Env {
    /// A rendered frame.
    type Frame: Clone + Debug;

    /// One frame per environment.
    fn screen(&mut self) -> Vec<Self::Frame>;
}
