//! # velostream-codec
//!
//! Schema-governed codecs for the velostream gateway data plane. Payloads framed
//! with a schema-registry envelope are validated against, and transcoded between,
//! their Avro or Protobuf binary form and JSON.
//!
//! ## Features
//!
//! - **Cached Registry Client**: Schema text by id and schema id by subject/version,
//!   with de-duplicated in-flight fetches, exponential back-off and stale-id fallback
//! - **Compiled Schema Cache**: Parsed schemas and descriptors memoized per schema id,
//!   invalidated by CRC32C checksum
//! - **Wire Framing**: Magic byte + big-endian schema id, plus zig-zag varint index
//!   paths for nested Protobuf messages
//! - **Avro and Protobuf Codecs**: Validate, read (binary to native/JSON) and write
//!   (JSON/native to framed binary) with fragment re-assembly and output padding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use velostream_codec::{CatalogConfig, FragmentFlags, ModelCodec, ModelConfig, SchemaRegistryClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut props = HashMap::new();
//!     props.insert("catalog.url".to_string(), "http://localhost:8081".to_string());
//!     props.insert("model.format".to_string(), "avro".to_string());
//!     props.insert("model.operation".to_string(), "validate".to_string());
//!     props.insert("model.subject".to_string(), "orders-value".to_string());
//!
//!     let catalog = Arc::new(SchemaRegistryClient::from_config(CatalogConfig::from_properties(&props)?)?);
//!     let mut codec = ModelCodec::new(ModelConfig::from_properties(&props)?, catalog)?;
//!
//!     let message = [0x00, 0x00, 0x00, 0x00, 0x07, 0x06, b'i', b'd', b'0'];
//!     let valid = codec.validate(&message, FragmentFlags::COMPLETE).await;
//!     println!("valid: {}", valid);
//!     Ok(())
//! }
//! ```

#![allow(clippy::derivable_impls)]
#![allow(clippy::collapsible_if)]

pub mod velostream;

pub use velostream::config::{CatalogConfig, ModelConfig, ModelFormat, ModelOperation, ModelView};
pub use velostream::observability::events::{
    EventSink, LogEventSink, RecordingEventSink, SchemaEvent,
};
pub use velostream::schema::client::inline::InlineCatalog;
pub use velostream::schema::client::registry_client::SchemaRegistryClient;
pub use velostream::schema::client::transport::{HttpRegistryTransport, RegistryTransport};
pub use velostream::schema::{SchemaCatalog, SchemaError, SchemaId, SchemaResult, NO_SCHEMA_ID};
pub use velostream::serialization::fragment::FragmentFlags;
pub use velostream::serialization::{Converted, ModelCodec, SerializationError};
