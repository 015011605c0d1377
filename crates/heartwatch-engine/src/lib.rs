//! heartwatch-engine: the async watchdog core.
//!
//! Partitions the heartbeat feed into one bounded channel per stream,
//! runs one pipeline task per stream over a [`heartwatch_core::group::GroupTable`],
//! and hands disconnect events to a notification dispatcher that is
//! isolated from the ingestion path.

pub mod bus;
pub mod dispatch;
pub mod watchdog;

pub use heartwatch_core::types;
