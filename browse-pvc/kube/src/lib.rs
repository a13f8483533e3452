#![warn(clippy::indexing_slicing)]

pub mod api;
pub mod error;
