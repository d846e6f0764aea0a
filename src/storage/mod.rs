pub mod file;

use crate::error::Result;
use crate::request::PendingRequest;

/// Backend holding one record per pending request.
///
/// This is the single source of truth shared by the hook and the daemon.
/// `update` is read-modify-write; concurrent writers to the same id are
/// prevented by the per-session lock, not by the store.
pub trait RequestStore: Send + Sync {
    /// Persist a new request. Fails if the id already exists.
    fn create(&self, request: &PendingRequest) -> Result<()>;

    /// Read a request. A missing record is `RelayError::RequestNotFound`.
    fn read(&self, id: &str) -> Result<PendingRequest>;

    /// Apply `mutator` to the stored request and write it back atomically.
    /// Nothing is written if the mutator fails.
    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut PendingRequest) -> Result<()>,
    ) -> Result<PendingRequest>;

    /// Remove a request. Removing a missing request is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// Every record in the store, including ones that failed to parse.
    fn scan(&self) -> Result<Vec<StoredEntry>>;
}

/// One record found by [`RequestStore::scan`].
#[derive(Debug, Clone)]
pub enum StoredEntry {
    Request(Box<PendingRequest>),
    Corrupt { id: String, reason: String },
}
