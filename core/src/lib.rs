pub mod error;
pub mod note;
pub mod sanitize;
pub mod store;
pub mod host;
pub mod config;
pub mod repository;
pub mod guard;
pub mod render;
pub mod columns;
pub mod request;
pub mod service;
pub mod ipc;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use config::{ConfigStore, ServerConfig, Settings};
pub use note::{ItemId, Note};
pub use store::{FileStore, MemoryStore, MetaStore, SharedStore};
pub use host::{Caller, Capability, ContentRegistry, ContentType, RequestContext, StaticRegistry};
pub use repository::{NoteRepository, SetManyResult, SortOrder};
pub use guard::{AccessGuard, TokenScope};
pub use service::{BulkOutcome, NoteService, SaveOutcome, SkipReason};
pub use ipc::{IpcClient, IpcServer, IpcMessage, IpcMessageType};
pub use error::{PostNotesError, Result};

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::*;
    pub use crate::note::*;
    pub use crate::sanitize::sanitize;
    pub use crate::error::Result;
}
