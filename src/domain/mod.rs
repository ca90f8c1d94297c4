//! Core domain types
//!
//! Pure types with no I/O dependencies: buffer and session values, the error
//! taxonomy and the driver configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
