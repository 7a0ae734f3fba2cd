//! Log de eventos de batch y trait EventStore.

mod store;
mod types;

pub use store::{EventStore, InMemoryEventStore, JsonlEventStore};
pub use types::{BatchEvent, BatchEventKind};
