//! Storage layer for scanbase
//!
//! Typed documents, per-collection stores and the value codec.

pub mod codec;
pub mod collection;
pub mod document;
