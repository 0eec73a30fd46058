pub mod client;
pub mod endpoints;

pub use client::{DataSource, HttpDataSource, ServerTime};
pub use endpoints::{CandleQuery, DataSourceKind};
