//! Shared types for the spinload workspace.
//!
//! `work` carries the single `InvokeWork` RPC contract, `attempt` holds the
//! load driver's per-call record and the run-level summary.

pub mod attempt;
pub mod clock;
pub mod work;

pub use attempt::*;
pub use clock::*;
pub use work::*;
