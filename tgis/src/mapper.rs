use std::io;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};

/// A trait for storing and loading registry records in an arbitrary key/value store.
///
/// Keys are plain strings derived from the fully qualified identity of the object being stored,
/// e.g. `map/raster/elevation@PERMANENT`.
///
#[async_trait]
pub trait Mapper: Send + Sync {
    /// Obtain an output stream for writing an object to the store under `key`.
    ///
    /// Nothing is visible to readers until `finish` is called on the returned `StoreWrite`, at
    /// which point the object replaces any previous object stored under the same key.
    ///
    async fn store(&self, key: &str) -> Box<dyn StoreWrite + '_>;

    /// Obtain an input stream for reading an object from the store.
    ///
    /// Should return `Option::None` if given `key` isn't in the store. Any other failure to get
    /// at the object is an error.
    ///
    async fn load(&self, key: &str) -> io::Result<Option<Box<dyn AsyncRead + Unpin + Send + '_>>>;

    /// Remove the object stored under `key`. Returns whether there was anything to remove.
    ///
    async fn remove(&self, key: &str) -> io::Result<bool>;
}

#[async_trait]
pub trait StoreWrite: AsyncWrite + Unpin + Send {
    /// Close the output stream and commit the newly written object.
    ///
    async fn finish(self: Box<Self>) -> io::Result<()>;
}
