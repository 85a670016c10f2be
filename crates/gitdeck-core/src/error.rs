//! Error types for gitdeck operations.
//!
//! This module defines [`DeckError`], the error enum shared by every gitdeck
//! crate. Nothing in the dashboard core is fatal to the process: command and
//! producer failures are turned into panel text by the caller, so most
//! variants carry a human-readable message that renders well on one line.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`DeckError`].
pub type Result<T> = std::result::Result<T, DeckError>;

/// Error type for all gitdeck operations.
#[derive(Debug, Error)]
pub enum DeckError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Command Errors
    // =========================================================================
    /// The command could not be started at all
    #[error("Failed to start `{command}`: {message}")]
    CommandSpawn { command: String, message: String },

    /// The command ran but exited unsuccessfully
    #[error("`{command}` exited with code {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Opening a pseudo-terminal failed
    #[error("Failed to open pseudo-terminal: {message}")]
    Pty { message: String },

    // =========================================================================
    // TUI Errors
    // =========================================================================
    /// Terminal initialization failed
    #[error("Terminal initialization failed: {message}")]
    TerminalInit { message: String },

    /// Terminal restore failed
    #[error("Failed to restore terminal: {message}")]
    TerminalRestore { message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in gitdeck)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DeckError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a ConfigNotFound error with source
    pub fn config_not_found_with_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: Some(source),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a command spawn error
    pub fn command_spawn(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandSpawn {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a pseudo-terminal error from any displayable cause
    pub fn pty(cause: impl std::fmt::Display) -> Self {
        Self::Pty {
            message: cause.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Check the YAML syntax of your gitdeck config.yml"),
            Self::ConfigValidation { .. } => {
                Some("sidePanelWidth must be between 0 and 1 and scrollHeight at least 1")
            }
            Self::CommandSpawn { .. } => Some("Check that git is installed and on your PATH"),
            Self::TerminalInit { .. } => Some("Try running in a different terminal"),
            _ => None,
        }
    }
}
