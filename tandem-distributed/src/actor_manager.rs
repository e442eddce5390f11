//! A manager of actor workers.
mod base;
mod config;
pub use base::ActorManager;
pub use config::ActorManagerConfig;
