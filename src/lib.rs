//! # Store Communications Library
//!
//! Announcement channels with per-store task distribution, store lookup
//! against the workplace platform's user directory, and bulk profile imports.

pub mod announce;
pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod history;
pub mod import;
pub mod merge;
pub mod platform;
pub mod server;
pub mod telemetry;
