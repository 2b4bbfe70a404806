//! Searchbot admin tooling.
//!
//! Gift card issuance, CSV import and export, redemption and statistics,
//! plus applying the schema migrations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use config::AdminConfig;
pub use error::{AdminError, Result};
