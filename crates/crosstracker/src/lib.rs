//! CrossTracker: TQL queries across the trackers of several projects, compiled to parametrized SQL.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod datetime;
pub mod engine;
pub mod model;
pub mod query;
pub mod result;
pub mod store;
pub mod tql;
pub mod types;
pub mod validation;

pub use catalog::{SqliteCatalog, TrackerCatalog};
pub use config::{EngineConfig, UserDisplayFormat};
pub use engine::{CrossTrackerEngine, Explanation, Page};
pub use query::{CrossTrackerQuery, QueryRepository, WidgetId, WidgetOwner};
pub use result::{QueryReport, ValueRepresentation};
pub use store::TrackerDatabaseBuilder;
pub use types::*;
pub use validation::{Fault, QueryScope};
