//! Core traits and data types.
mod agent;
mod buffer;
mod env;
mod output;
mod policy;
pub use agent::Agent;
pub use buffer::{DataSource, RolloutStep, SharedBuffer, TrajectoryBuffer};
pub use env::{Env, EnvType, EpisodeInfo, RandomAction, Screen};
pub use output::{Act, EnvOutput, Obs, PolicyOutput, Terms};
pub use policy::Policy;
