pub mod aggregate;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod schema;
pub mod store;
pub mod sync;
pub mod upsert;

pub use error::{Result, SyncError};
