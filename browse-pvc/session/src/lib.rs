#![warn(clippy::indexing_slicing)]

//! Bridges the local terminal to a shell running in the browse pod.
//!
//! [`session::Session::attach`] puts the terminal in raw mode, opens a TTY `exec` on the pod,
//! pipes bytes both ways and keeps the remote window size in sync with the local one until the
//! remote shell exits.

pub mod error;
pub mod exec;
pub mod resize;
pub mod session;
pub mod terminal;
