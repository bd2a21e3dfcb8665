//! Unit tests for conversion output bounds

use std::sync::Arc;

use crate::unit::common::{init_logging, EVENT_AVRO_PAYLOAD, EVENT_AVRO_SCHEMA, EVENT_JSON};
use velostream_codec::velostream::serialization::PaddingBound;
use velostream_codec::{
    FragmentFlags, InlineCatalog, ModelCodec, ModelConfig, ModelFormat, ModelOperation, ModelView,
    SchemaCatalog,
};

const BLOB_AVRO_SCHEMA: &str = r#"{
    "type": "record",
    "name": "Blob",
    "fields": [{"name": "text", "type": "string"}]
}"#;

const FLAGS_AVRO_SCHEMA: &str = r#"{"type": "array", "items": "boolean"}"#;

const FLAGS_PROTO_SCHEMA: &str = r#"syntax = "proto3";
package io.velostream.examples.flags;

message Flags {
    repeated bool flags = 1;
    map<string, int64> counters = 2;
}
"#;

fn codec(
    format: ModelFormat,
    operation: ModelOperation,
    view: ModelView,
    catalog: Arc<dyn SchemaCatalog>,
) -> ModelCodec {
    init_logging();
    let config = ModelConfig::new(format, operation)
        .with_view(view)
        .with_schema_id(2);
    ModelCodec::new(config, catalog).expect("valid model configuration")
}

/// Convert `input` and check the reserved padding was enough for the output
async fn assert_padding_covers(codec: &mut ModelCodec, input: &[u8]) -> Vec<u8> {
    let padding = codec.padding(input).await;
    let output = codec
        .convert(input, FragmentFlags::COMPLETE)
        .await
        .into_output()
        .expect("conversion succeeds");
    assert!(
        input.len() + padding >= output.len(),
        "padding {} too small for {} -> {} bytes",
        padding,
        input.len(),
        output.len()
    );
    output
}

#[test]
fn test_bound_arithmetic() {
    let bound = PaddingBound::new(16, 6);
    assert_eq!(bound.output_bound(10), 76);
    assert_eq!(bound.padding(10), 66);
    assert_eq!(PaddingBound::ZERO.padding(10), 0);
    assert_eq!(PaddingBound::new(2, 1).padding(10), 2);
}

#[tokio::test]
async fn test_validate_needs_no_padding() {
    let catalog: Arc<dyn SchemaCatalog> = Arc::new(InlineCatalog::new("catalog0", 2, EVENT_AVRO_SCHEMA));
    let codec = codec(ModelFormat::Avro, ModelOperation::Validate, ModelView::Json, catalog);
    assert_eq!(codec.padding(EVENT_AVRO_PAYLOAD).await, 0);
}

#[tokio::test]
async fn test_write_padding_reserves_envelope() {
    let catalog: Arc<dyn SchemaCatalog> =
        Arc::new(InlineCatalog::new("catalog0", 2, EVENT_AVRO_SCHEMA).framed());
    let mut native = codec(ModelFormat::Avro, ModelOperation::Write, ModelView::Native, catalog.clone());
    assert_eq!(native.padding(EVENT_AVRO_PAYLOAD).await, 5);
    assert_padding_covers(&mut native, EVENT_AVRO_PAYLOAD).await;

    let mut json = codec(ModelFormat::Avro, ModelOperation::Write, ModelView::Json, catalog);
    assert_padding_covers(&mut json, EVENT_JSON.as_bytes()).await;
}

#[tokio::test]
async fn test_escaped_strings_fit() {
    let catalog: Arc<dyn SchemaCatalog> = Arc::new(InlineCatalog::new("catalog0", 2, BLOB_AVRO_SCHEMA));
    let mut reader = codec(ModelFormat::Avro, ModelOperation::Read, ModelView::Json, catalog);

    // Control characters print as six-character escapes
    let mut payload = vec![0x14];
    payload.extend_from_slice(&[0x01; 10]);
    let output = assert_padding_covers(&mut reader, &payload).await;
    assert_eq!(output.len(), r#"{"text":""}"#.len() + 60);
}

#[tokio::test]
async fn test_dense_avro_arrays_fit() {
    let catalog: Arc<dyn SchemaCatalog> = Arc::new(InlineCatalog::new("catalog0", 2, FLAGS_AVRO_SCHEMA));
    let mut reader = codec(ModelFormat::Avro, ModelOperation::Read, ModelView::Json, catalog);

    let payload = [0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    let output = assert_padding_covers(&mut reader, &payload).await;
    assert_eq!(output, b"[false,false,false,false,false]".to_vec());

    let empty = [0x00];
    assert_padding_covers(&mut reader, &empty).await;
}

#[tokio::test]
async fn test_dense_protobuf_fields_fit() {
    let catalog: Arc<dyn SchemaCatalog> = Arc::new(InlineCatalog::new("catalog0", 2, FLAGS_PROTO_SCHEMA));
    let mut reader = codec(
        ModelFormat::Protobuf,
        ModelOperation::Read,
        ModelView::Json,
        catalog.clone(),
    );

    let packed = [0x00, 0x0a, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00];
    let output = assert_padding_covers(&mut reader, &packed).await;
    assert_eq!(
        String::from_utf8(output).expect("UTF-8 JSON"),
        r#"{"flags":[false,false,false,false,false],"counters":{}}"#
    );

    // counters {"a": -1}
    let mut map_entry = vec![0x00, 0x12, 0x0e, 0x0a, 0x01, b'a', 0x10];
    map_entry.extend_from_slice(&[0xff; 9]);
    map_entry.push(0x01);
    let output = assert_padding_covers(&mut reader, &map_entry).await;
    assert_eq!(
        String::from_utf8(output).expect("UTF-8 JSON"),
        r#"{"flags":[],"counters":{"a":"-1"}}"#
    );

    let mut writer = codec(ModelFormat::Protobuf, ModelOperation::Write, ModelView::Json, catalog);
    assert_padding_covers(&mut writer, br#"{"flags":[true,false],"counters":{"a":"7"}}"#).await;
    assert_padding_covers(&mut writer, b"{}").await;
}
