//! Local persistence: named key/value entries plus the creation history and
//! credential stores layered on top of them.

mod creation_store;
mod credential;
mod examples;
mod kv;

pub use creation_store::{CreationStore, ImportError, HISTORY_KEY};
pub use credential::{CredentialStore, CREDENTIAL_KEY};
pub use examples::{ExampleSource, NameLocalizer, NoExamples, StaticExampleSource};
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
