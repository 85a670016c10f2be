//! # gitdeck-core
//!
//! Core types shared by every gitdeck crate.
//!
//! This crate provides:
//! - [`DeckError`] - error type for all gitdeck operations
//! - [`logging`] - tracing setup and log file locations
//!
//! ## Example
//!
//! ```no_run
//! use gitdeck_core::{DeckError, logging};
//!
//! fn main() -> gitdeck_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let config_path = std::path::Path::new("/etc/gitdeck/config.yml");
//!     if let Err(e) = std::fs::read_to_string(config_path) {
//!         return Err(DeckError::config_not_found_with_source(config_path, e));
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{DeckError, Result};
pub use logging::{LogGuard, init_logging};
