use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::{
    errors::Result,
    map::{MapId, MapType},
    time::TemporalExtent,
};

/// Who created a data object, and when.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct History {
    pub creator: String,
    pub ctime: NaiveDateTime,
}

/// The store that holds the maps themselves: raster cells, vector geometries and the metadata
/// kept alongside them.
///
/// The registration engine never looks at map contents. It only needs to know whether a map
/// exists, where it came from, what time stamp has been attached to it outside of the temporal
/// database, and whether it holds any data at all.
///
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn exists(&self, map_type: MapType, id: &MapId) -> Result<bool>;

    /// Creation history of the object, `None` if the store keeps none for it.
    async fn creation_history(&self, map_type: MapType, id: &MapId) -> Result<Option<History>>;

    /// A time stamp attached to the object itself, if any.
    async fn timestamp(&self, map_type: MapType, id: &MapId) -> Result<Option<TemporalExtent>>;

    /// Whether the object holds no data: an all null raster or a vector map without features.
    async fn is_empty(&self, map_type: MapType, id: &MapId) -> Result<bool>;

    /// Delete the object.
    async fn remove(&self, map_type: MapType, id: &MapId) -> Result<()>;
}
