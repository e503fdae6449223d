//! The `logger` module wires `tracing` to stdout with a reloadable filter.
//! See `bin/logger_demo.rs` for a binary exercising it by hand.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
