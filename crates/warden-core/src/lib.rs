//! Core lifecycle policy engine for wardend
//!
//! This crate is the heart of wardend, containing:
//! - Remaining-time evaluators for the two timeout dimensions
//!   (absolute max lifetime, inactivity)
//! - The notification escalation policy (rate-limited, capped warnings)
//! - The termination executor (stop persistent instances, delete the rest)
//! - The per-instance evaluation flow tying it all together, safe under
//!   at-least-once, re-entrant invocation

mod engine;
mod escalation;
mod evaluate;
mod notify;
mod termination;

pub use engine::*;
pub use escalation::*;
pub use evaluate::*;
pub use notify::*;
pub use termination::*;
