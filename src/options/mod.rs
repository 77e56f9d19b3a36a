//! Worker options - raw option maps, validation, and memory size parsing.

pub mod memory;
pub mod resolver;

pub use memory::parse_memory_limit;
pub use resolver::{MemoryLimit, OptionValue, RawOptions, WorkerOptions, resolve};
