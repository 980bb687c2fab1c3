//! Resource model for warden
//!
//! This crate defines the objects the lifecycle engine operates on:
//! - `Instance`: a provisioned ephemeral environment with its durable
//!   timer-state metadata
//! - `Template`: the policy source for a class of instances
//! - The metadata key contracts shared between the engine and the store

mod keys;
mod types;

pub use keys::*;
pub use types::*;
