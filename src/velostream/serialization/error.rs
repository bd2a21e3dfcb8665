//! Error types for serialization

use crate::velostream::config::ConfigError;
use crate::velostream::schema::SchemaId;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Reasons a message is rejected, or a codec cannot be built
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("No schema id could be resolved: {reason}")]
    SchemaIdUnresolved { reason: String },

    #[error("Schema {schema_id} is not available from the catalog")]
    SchemaUnavailable { schema_id: SchemaId },

    #[error("Failed to compile schema {schema_id}: {message}")]
    SchemaCompile {
        schema_id: SchemaId,
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    #[error("Message type '{name}' not found in schema {schema_id}")]
    MessageTypeNotFound { name: String, schema_id: SchemaId },

    #[error("Malformed envelope: {message}")]
    Framing { message: String },

    #[error("Failed to decode payload: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    #[error("Failed to encode payload: {message}")]
    Encode {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    #[error("Fragment rejected: {message}")]
    Fragment { message: String },

    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SerializationError {
    pub fn decode(message: impl Into<String>) -> Self {
        SerializationError::Decode {
            message: message.into(),
            source: None,
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        SerializationError::Encode {
            message: message.into(),
            source: None,
        }
    }

    /// Decode failure reported by apache-avro
    pub fn avro_error(message: &str, error: apache_avro::Error) -> Self {
        SerializationError::Decode {
            message: format!("{}: {}", message, error),
            source: Some(Box::new(error)),
        }
    }

    /// Decode failure reported by prost
    pub fn protobuf_error(message: &str, error: prost::DecodeError) -> Self {
        SerializationError::Decode {
            message: format!("{}: {}", message, error),
            source: Some(Box::new(error)),
        }
    }

    /// Malformed JSON input on the write path
    pub fn json_error(message: &str, error: serde_json::Error) -> Self {
        SerializationError::Encode {
            message: format!("{}: {}", message, error),
            source: Some(Box::new(error)),
        }
    }
}

pub type SerializationResult<T> = Result<T, SerializationError>;
