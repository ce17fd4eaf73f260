//! Durable storage collaborator: a small key/blob substrate the queue and
//! device identity are persisted into.

#[cfg(feature = "fs")]
mod file;
mod identity;
mod in_memory;
mod store;

#[cfg(feature = "fs")]
pub use file::FileStorage;
pub use identity::DeviceIdentity;
pub use in_memory::InMemoryStorage;
pub use store::Storage;
