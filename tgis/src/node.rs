use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};

use crate::errors::Result;

pub(crate) const NODE_MAP: u8 = 1;
pub(crate) const NODE_DATASET: u8 = 2;

/// A record that can be persisted by the `Registry`.
///
#[async_trait]
pub(crate) trait Node: Sized {
    const NODE_TYPE: u8;

    /// Save an object to a stream
    ///
    async fn save_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()>;

    /// Load an object from a stream
    async fn load_from(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<Self>;
}
