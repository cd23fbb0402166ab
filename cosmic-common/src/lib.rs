//! Cosmic Common - Shared configuration, errors, and logging for Cosmic Watch.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Small string utilities (truncation, log redaction)

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, FeedConfig, MonitorConfig, ObservabilityConfig, ServerConfig, StoreConfig,
    TelegramConfig,
};
pub use error::Error;
pub use validation::{Validate, ValidationError};
