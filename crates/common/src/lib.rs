//! Common utilities and types shared across Teller Console components.

#![warn(clippy::pedantic)]

/// Module for correlation and identity newtypes
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for scrubbing credentials out of error bodies before they are surfaced
pub mod sanitize;
