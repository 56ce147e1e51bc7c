//! Host-facing JSON bridge used by native front ends.

pub mod contract;
pub mod handler;
pub mod stdio;

pub use handler::CommandRouter;
pub use stdio::{run_bridge, run_stdio_bridge};
