//! # Trellis
//!
//! HTTP, CLI and configuration layers around `trellis-core`.
//!
//! The binary in `main.rs` is a thin wrapper: everything it runs lives here
//! so integration tests can build routers and stores directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod demo;
