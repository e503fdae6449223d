//! The `settings` module loads `settings/*.toml` through the `config` crate.
//! See `bin/settings_demo.rs` for a binary exercising it by hand.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
