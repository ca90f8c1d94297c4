//! Port traits (interfaces)
//!
//! These traits define the boundaries between the driver core and external I/O.
//! Adapters implement these traits to connect to real hardware.

pub mod power;
pub mod serial;

pub use power::*;
pub use serial::*;
