//! Unit tests for the inline catalog

use velostream_codec::{InlineCatalog, SchemaCatalog, NO_SCHEMA_ID};

use crate::unit::common::{framed, EVENT_AVRO_SCHEMA};

#[tokio::test]
async fn test_resolves_only_its_configured_id() {
    let catalog = InlineCatalog::new("inline0", 9, EVENT_AVRO_SCHEMA);

    let schema = catalog.resolve_by_id(9).await.expect("configured id resolves");
    assert_eq!(schema.text(), EVENT_AVRO_SCHEMA);
    assert!(catalog.resolve_by_id(10).await.is_none());
    assert_eq!(catalog.resolve_subject_version("any-subject", "latest").await, 9);
    assert_eq!(catalog.name(), "inline0");
}

#[test]
fn test_unframed_catalog_adds_no_envelope() {
    let catalog = InlineCatalog::new("inline0", 9, EVENT_AVRO_SCHEMA);

    assert_eq!(catalog.extract_id(b"anything"), 9);
    assert_eq!(catalog.decode_envelope(b"anything"), Some((9, 0)));
    assert_eq!(catalog.encode_padding(), 0);

    let mut out = Vec::new();
    catalog.encode_envelope(9, &mut out);
    assert!(out.is_empty());
}

#[test]
fn test_framed_catalog_uses_registry_envelope() {
    let catalog = InlineCatalog::new("inline0", 9, EVENT_AVRO_SCHEMA).framed();
    let message = framed(9, b"payload");

    assert_eq!(catalog.extract_id(&message), 9);
    assert_eq!(catalog.decode_envelope(&message), Some((9, 5)));
    assert_eq!(catalog.extract_id(b"payload"), NO_SCHEMA_ID);
    assert_eq!(catalog.encode_padding(), 5);

    let mut out = Vec::new();
    catalog.encode_envelope(9, &mut out);
    assert_eq!(out, vec![0x00, 0x00, 0x00, 0x00, 0x09]);
}

#[tokio::test]
async fn test_updated_schema_changes_checksum() {
    let catalog = InlineCatalog::new("inline0", 9, EVENT_AVRO_SCHEMA);
    let before = catalog.resolve_by_id(9).await.expect("schema").checksum();

    catalog.update_schema(r#"{"type":"string"}"#).await;
    let after = catalog.resolve_by_id(9).await.expect("schema");

    assert_eq!(after.text(), r#"{"type":"string"}"#);
    assert_ne!(before, after.checksum());
}

#[tokio::test]
async fn test_inline_catalog_does_not_register() {
    let catalog = InlineCatalog::new("inline0", 9, EVENT_AVRO_SCHEMA);
    assert_eq!(catalog.register("s", "avro", EVENT_AVRO_SCHEMA).await, NO_SCHEMA_ID);
    assert!(catalog.unregister("s").await.is_empty());
}
