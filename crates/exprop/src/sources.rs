//! 🚰 Sources -- where the lines come from.
//!
//! Both of these implement [`LineSource`](crate::engine::LineSource), so the line processor has
//! no idea whether it is reading a bucket in another region or a `Vec` in the next stack frame.
//!
//! - [`ObjectLines`]: streams an exported object out of an `object_store`, splits on `\n` with
//!   `memchr`, and inflates `.gz` exports first.
//! - [`InMemoryLines`]: a canned list of lines, optionally with a fault at a chosen position.

mod in_mem_lines;
mod object_lines;

pub use in_mem_lines::InMemoryLines;
pub use object_lines::ObjectLines;
