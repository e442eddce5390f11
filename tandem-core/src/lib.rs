#![warn(missing_docs)]
//! Core traits and loops of tandem.
//!
//! * [`Env`], [`Policy`] and [`Agent`] describe the collaborators.
//! * [`runner::Runner`] steps environments and stores episode statistics.
//! * [`evaluator`] runs rollout-only episodes with partial resets.
//! * [`trainer::CollectTrainLoop`] alternates collection into a
//!   [`TrajectoryBuffer`] and optimization.
pub mod dummy;
pub mod error;
pub mod evaluator;
pub mod record;
pub mod rms;
pub mod runner;
pub mod trainer;
pub mod util;

mod base;
pub use base::{
    Act, Agent, DataSource, Env, EnvOutput, EnvType, EpisodeInfo, Obs, Policy, PolicyOutput,
    RandomAction, RolloutStep, Screen, SharedBuffer, Terms, TrajectoryBuffer,
};

mod rollout_buffer;
pub use rollout_buffer::{RolloutBuffer, RolloutBufferConfig, RolloutSample};
