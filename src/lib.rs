//! shelf-rs: a self-hosted comics library server.
//!
//! Books are discovered by scanning library folders and processed by a
//! prioritized background task pipeline: analysis, hashing, thumbnails,
//! metadata, sidecar artwork, extension repair and CBZ conversion.
//!
//! # Features
//!
//! - In-process priority queue with FIFO ordering per priority and
//!   configurable priority bands per worker group
//! - Thumbnail selection with self-repairing housekeeping
//! - Page content with on-the-fly resize and format conversion
//! - Atomic book deletion across every table that references a book
//! - JPEG XL page support
//! - Title search

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Domain events.
pub mod events;
/// Book container formats.
pub mod formats;
/// File hashing.
pub mod hash;
/// Image decoding, resizing and conversion.
pub mod imaging;
/// Library, book and thumbnail models.
pub mod library;
/// HTTP server.
pub mod server;
/// Domain services.
pub mod services;
/// Background tasks.
pub mod tasks;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
