//! A manager of trainer workers.
mod base;
mod config;
pub use base::TrainerManager;
pub use config::TrainerManagerConfig;
