use tracing::debug;

use crate::{
    errors::Result,
    map::{MapId, MapType},
    store::DataStore,
};

/// What to do with a map that is about to join a space time dataset.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Register,

    /// Remove the map from the temporal database and the data store instead
    Purge,
}

/// Decides, one map at a time, whether maps without data are purged rather than registered.
///
pub struct EmptyMapFilter<'a> {
    store: &'a dyn DataStore,
}

impl<'a> EmptyMapFilter<'a> {
    pub fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// The data store is only asked about emptiness when `delete_empty` is set.
    ///
    pub async fn decide(
        &self,
        map_type: MapType,
        id: &MapId,
        delete_empty: bool,
    ) -> Result<Decision> {
        if delete_empty && self.store.is_empty(map_type, id).await? {
            debug!(map = %id, map_type = %map_type, "empty map will be purged");
            Ok(Decision::Purge)
        } else {
            Ok(Decision::Register)
        }
    }
}
