//! Write-ahead logging integration seam.
//!
//! The buffer pool accepts a [`LogManager`] at construction and threads
//! it through to every shard, but the core never calls it; it exists so
//! recovery can hook in without changing the pool's construction
//! surface.

mod log_manager;

pub use log_manager::LogManager;
