//! ⚙️ The engine -- throttle, accumulate, propagate, repeat.
//!
//! 🧠 Knowledge graph:
//! - [`throttler`]: the minimum gap between two propagations of one file.
//! - [`accumulator`]: the byte-bounded basket. Flushes itself, records outcomes, merges.
//! - [`line_processor`]: drives one file's lines through one accumulator and drains at the end.
//!
//! Nothing in here knows about buckets, HTTP, or config files. The engine takes a line source,
//! a propagator, and two numbers. Everything else is somebody else's module. 🦆

pub mod accumulator;
pub mod line_processor;
pub mod throttler;

pub use accumulator::Accumulator;
pub use line_processor::{LineSource, process_lines};
pub use throttler::{InterruptSignal, Interrupter, Throttler};
