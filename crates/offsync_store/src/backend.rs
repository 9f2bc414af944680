//! Byte-level backends holding the store log.

use crate::error::StoreResult;

/// An append-only byte log underneath a [`crate::LocalStore`].
///
/// Backends are opaque: they never interpret frames. The store owns the
/// frame format, replay and compaction.
///
/// # Invariants
///
/// - `append` returns the offset at which the bytes start
/// - `read_at` returns exactly what was appended at that offset
/// - after `sync` returns, every appended byte survives process exit
/// - `replace` swaps the whole content atomically (old or new, never a mix)
pub trait LogBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

    /// Appends bytes at the end of the log and returns their offset.
    fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Forces appended bytes to durable storage.
    fn sync(&mut self) -> StoreResult<()>;

    /// Current log length in bytes.
    fn size(&self) -> StoreResult<u64>;

    /// Drops everything past `new_size`. Used to cut off a torn tail frame.
    fn truncate(&mut self, new_size: u64) -> StoreResult<()>;

    /// Replaces the whole log with `data`. Used by compaction.
    fn replace(&mut self, data: &[u8]) -> StoreResult<()>;

    /// Reads the full log.
    fn read_all(&self) -> StoreResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }
}
