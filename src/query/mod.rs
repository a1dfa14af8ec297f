//! Search compilation and predicate evaluation

pub mod compiler;
pub mod filter;

pub use compiler::{compile_advanced_search, compile_filter, compile_rapid_search};
pub use filter::evaluate;
