//! Audio data types, decoded-stream sources, and the filter graph

pub mod filter;
pub mod source;
pub mod types;
