//! lingua-ci core
//!
//! Core domain types, port traits, and error handling for the
//! continuous-localization build scheduler. This crate has minimal
//! dependencies and defines the shared vocabulary used by the scheduler
//! and by host adapters (metadata store, build executor, change source).

pub mod change;
pub mod config;
pub mod error;
pub mod ids;
pub mod ports;
pub mod request;
pub mod tree;

pub use error::{Error, Result};
pub use ids::*;
