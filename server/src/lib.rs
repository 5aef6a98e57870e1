//! Search and availability server.
//!
//! [`config`] reads the environment, [`app`] wires the components and the
//! `staysearch` binary runs them until a shutdown signal.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]

pub mod app;
pub mod config;

pub use app::{build, Services};
pub use config::{Config, ConfigError};
