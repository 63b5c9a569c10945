//! Command line front-end for the cross-tracker TQL engine.

pub mod config;
pub mod demo;
pub mod output;
pub mod repl;
pub mod session;

pub use config::{load_engine_config, resolve_db_path};
pub use output::{describe_error, render_report, OutputFormat};
pub use session::{ScopeArgs, TrackerSession};
