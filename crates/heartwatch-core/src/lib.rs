//! heartwatch-core: data model, stream registry, and the per-key group
//! timeout state machine.
//!
//! Pure and deterministic — no async, no IO, all time values passed in as
//! parameters. The async engine crate drives these state machines.

pub mod group;
pub mod registry;
pub mod types;
