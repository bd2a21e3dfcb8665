//! Schema catalog clients

pub mod in_flight;
pub mod inline;
pub mod registry_client;
pub mod transport;

pub use inline::InlineCatalog;
pub use registry_client::SchemaRegistryClient;
pub use transport::{AuthConfig, HttpRegistryTransport, RegistryTransport};
