pub mod config;
pub mod observability;
pub mod schema;
pub mod serialization;
