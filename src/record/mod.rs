mod event_kind;
mod event_record;
mod id;

pub use event_kind::{EventKind, UnknownEventKind};
pub use event_record::{Connectivity, EventMetadata, EventRecord, InverseDescriptor};
pub use id::{EventId, IdGenerator};
