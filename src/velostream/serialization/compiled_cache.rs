//! Compiled schema cache
//!
//! Parsing a schema into something a codec can use is far more expensive than
//! fetching its text, so each codec model keeps one compiled artifact per schema
//! id. Every entry remembers the CRC32C checksum of the text it was compiled
//! from; [`CompiledSchemaCache::invalidate_if_changed`] drops entries whose text
//! has since changed in the catalog.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::velostream::schema::{SchemaCatalog, SchemaId, NO_SCHEMA_ID};
use crate::velostream::serialization::{SerializationError, SerializationResult};

/// Turns schema text into a format-specific artifact
pub trait SchemaCompiler: Send + Sync {
    type Artifact: Send + Sync;

    fn compile(&self, schema_id: SchemaId, schema: &str) -> SerializationResult<Self::Artifact>;
}

#[derive(Debug)]
pub struct CompiledSchema<A> {
    schema_id: SchemaId,
    checksum: u32,
    artifact: A,
}

impl<A> CompiledSchema<A> {
    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    /// CRC32C of the schema text the artifact was compiled from
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn artifact(&self) -> &A {
        &self.artifact
    }
}

pub struct CompiledSchemaCache<C: SchemaCompiler> {
    catalog: Arc<dyn SchemaCatalog>,
    compiler: C,
    entries: RwLock<HashMap<SchemaId, Arc<CompiledSchema<C::Artifact>>>>,
}

impl<C: SchemaCompiler> CompiledSchemaCache<C> {
    pub fn new(catalog: Arc<dyn SchemaCatalog>, compiler: C) -> Self {
        Self {
            catalog,
            compiler,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }

    /// Compiled artifact for `schema_id`, resolving and compiling it on first use
    pub async fn get(&self, schema_id: SchemaId) -> SerializationResult<Arc<CompiledSchema<C::Artifact>>> {
        if let Some(compiled) = self.entries.read().await.get(&schema_id) {
            return Ok(compiled.clone());
        }
        if schema_id <= NO_SCHEMA_ID {
            return Err(SerializationError::SchemaUnavailable { schema_id });
        }

        let schema = self
            .catalog
            .resolve_by_id(schema_id)
            .await
            .ok_or(SerializationError::SchemaUnavailable { schema_id })?;
        let artifact = self.compiler.compile(schema_id, schema.text())?;
        log::debug!(
            "Compiled schema {} from catalog '{}'",
            schema_id,
            self.catalog.name()
        );

        let mut compiled = Arc::new(CompiledSchema {
            schema_id,
            checksum: schema.checksum(),
            artifact,
        });

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&schema_id) {
            return Ok(existing.clone());
        }
        // The text may have changed, and been invalidated, while compiling
        if let Some(latest) = self.catalog.resolve_by_id(schema_id).await {
            if latest.checksum() != compiled.checksum {
                log::debug!(
                    "Schema {} changed in catalog '{}' while compiling, recompiling",
                    schema_id,
                    self.catalog.name()
                );
                compiled = Arc::new(CompiledSchema {
                    schema_id,
                    checksum: latest.checksum(),
                    artifact: self.compiler.compile(schema_id, latest.text())?,
                });
            }
        }
        entries.insert(schema_id, compiled.clone());
        Ok(compiled)
    }

    /// Cached artifact for `schema_id` without touching the catalog
    pub async fn peek(&self, schema_id: SchemaId) -> Option<Arc<CompiledSchema<C::Artifact>>> {
        self.entries.read().await.get(&schema_id).cloned()
    }

    /// Drop the entry for `schema_id` if the catalog now serves different text.
    ///
    /// Returns whether an entry was removed. Unchanged or uncached ids, and ids
    /// the catalog cannot currently resolve, leave the cache untouched.
    pub async fn invalidate_if_changed(&self, schema_id: SchemaId) -> bool {
        let Some(current) = self.peek(schema_id).await else {
            return false;
        };
        let Some(schema) = self.catalog.resolve_by_id(schema_id).await else {
            return false;
        };
        if crc32c::crc32c(schema.text().as_bytes()) == current.checksum {
            return false;
        }

        let mut entries = self.entries.write().await;
        let still_current = entries
            .get(&schema_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &current));
        if still_current {
            entries.remove(&schema_id);
            log::info!(
                "Schema {} changed in catalog '{}', dropped compiled artifact",
                schema_id,
                self.catalog.name()
            );
        }
        still_current
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
