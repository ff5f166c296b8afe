//! # Village Tools
//!
//! Headless drivers for the village simulation:
//! - A file-backed storage port
//! - Persistent CLI sessions on a manual clock
//! - Config validation

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod file_storage;
pub mod session;
pub mod validate;
