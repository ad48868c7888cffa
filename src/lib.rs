//! SubWatch library root.

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub type Result<T> = error::SubWatchResult<T>;

pub mod services;
pub mod watcher;
