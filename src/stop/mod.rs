//! Stop conditions - when a worker run should end.
//!
//! This module provides:
//! - StopCondition, the tagged predicate variants
//! - StopConditionSet, the ordered set owned by one run
//! - LoopState and StopReason, what the predicates read and report
//! - MemoryProbe, the process memory source for the memory limit

mod condition;
mod memory;
mod set;

pub use condition::{LoopState, StopCondition, StopReason};
pub use memory::{FixedMemoryProbe, MemoryProbe, ProcessMemoryProbe};
pub use set::StopConditionSet;
