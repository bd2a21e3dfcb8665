// === OBSERVABILITY MODULE ===
//
// Schema catalog and codec events. Events are edge-triggered by the registry
// client and handed to an `EventSink`; the library never installs a logger.

pub mod events;

pub use events::{EventSink, LogEventSink, RecordingEventSink, SchemaEvent};
