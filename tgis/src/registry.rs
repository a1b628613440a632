use std::{collections::HashMap, sync::Arc};

use futures::{io::AsyncRead, lock::Mutex as AsyncMutex};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    dataset::{DatasetId, SpaceTimeDataset},
    errors::{Error, Result},
    extio::{ExtendedAsyncRead, ExtendedAsyncWrite},
    map::{MapId, MapRecord, MapType},
    mapper::Mapper,
    node::Node,
};

const MAGIC_NUMBER: u16 = 0x7615;
const FORMAT_VERSION: u32 = 0;

/// The `Registry` is the durable store of map and space time dataset records.
///
/// To store and load records, a Registry must be provided with a concrete `Mapper`
/// implementation. Records are keyed by their fully qualified identity. Nothing is cached, every
/// read goes to the underlying store, so other components can consult the registry instead of
/// holding on to copies of its records.
///
/// Writes of a map record take that map's lock, and `update_map` holds it from the read until
/// the write, so concurrent changes to one map record are applied one after the other.
///
pub struct Registry {
    mapper: Box<dyn Mapper>,

    /// One lock per map record key that has been written through this `Registry`
    map_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Registry {
    /// Create a new `Registry`
    ///
    /// # Arguments
    ///
    /// * `mapper` - A boxed implementation of `Mapper`, which handles writing to and reading from
    ///   the underlying data store.
    ///
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        Self {
            mapper,
            map_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get a map's record, failing with `Error::NotFound` if it isn't registered.
    ///
    pub async fn get_map(&self, map_type: MapType, id: &MapId) -> Result<MapRecord> {
        self.find_map(map_type, id)
            .await?
            .ok_or_else(|| Error::not_found("map", id.to_string()))
    }

    /// Get a map's record, if it is registered.
    ///
    pub async fn find_map(&self, map_type: MapType, id: &MapId) -> Result<Option<MapRecord>> {
        self.retrieve(&map_key(map_type, id)).await
    }

    /// Write a map's record, replacing any previous record for the same map.
    ///
    pub async fn save_map(&self, record: &MapRecord) -> Result<()> {
        let key = map_key(record.map_type, &record.id);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        debug!(map = %record.id, map_type = %record.map_type, "save map record");
        self.save(&key, record).await
    }

    /// Change a map's record in place.
    ///
    /// `update` is given the current record, or `None` if the map isn't registered, and returns
    /// the record to write, or `None` to write nothing. The map's lock is held from the read until
    /// the write. Returns the record as written.
    ///
    pub async fn update_map<F>(
        &self,
        map_type: MapType,
        id: &MapId,
        update: F,
    ) -> Result<Option<MapRecord>>
    where
        F: FnOnce(Option<MapRecord>) -> Option<MapRecord> + Send,
    {
        let key = map_key(map_type, id);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let current = self.retrieve(&key).await?;
        match update(current) {
            Some(record) => {
                debug!(map = %id, map_type = %map_type, "update map record");
                self.save(&key, &record).await?;

                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn map_exists(&self, map_type: MapType, id: &MapId) -> Result<bool> {
        Ok(self.mapper.load(&map_key(map_type, id)).await?.is_some())
    }

    /// Remove a map's record. Returns whether the map was registered.
    ///
    pub async fn remove_map(&self, map_type: MapType, id: &MapId) -> Result<bool> {
        let key = map_key(map_type, id);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        debug!(map = %id, map_type = %map_type, "remove map record");
        Ok(self.mapper.remove(&key).await?)
    }

    /// Remove a map's record, returning the record as it was just before removal.
    ///
    pub async fn take_map(&self, map_type: MapType, id: &MapId) -> Result<Option<MapRecord>> {
        let key = map_key(map_type, id);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let record = self.retrieve(&key).await?;
        if record.is_some() {
            debug!(map = %id, map_type = %map_type, "remove map record");
            self.mapper.remove(&key).await?;
        }

        Ok(record)
    }

    /// Get a dataset's record, failing with `Error::NotFound` if it doesn't exist.
    ///
    pub async fn get_dataset(&self, id: &DatasetId) -> Result<SpaceTimeDataset> {
        self.find_dataset(id)
            .await?
            .ok_or_else(|| Error::not_found("space time dataset", id.to_string()))
    }

    pub async fn find_dataset(&self, id: &DatasetId) -> Result<Option<SpaceTimeDataset>> {
        self.retrieve(&dataset_key(id)).await
    }

    /// Write a dataset's record, replacing any previous record for the same dataset.
    ///
    pub async fn save_dataset(&self, dataset: &SpaceTimeDataset) -> Result<()> {
        debug!(
            dataset = %dataset.id,
            kind = %dataset.id.kind,
            members = dataset.members.len(),
            "save dataset record"
        );
        self.save(&dataset_key(&dataset.id), dataset).await
    }

    pub async fn dataset_exists(&self, id: &DatasetId) -> Result<bool> {
        Ok(self.mapper.load(&dataset_key(id)).await?.is_some())
    }

    /// Remove a dataset's record. Member map records are left alone.
    ///
    pub async fn remove_dataset(&self, id: &DatasetId) -> Result<bool> {
        debug!(dataset = %id, kind = %id.kind, "remove dataset record");
        Ok(self.mapper.remove(&dataset_key(id)).await?)
    }

    /// Store a node
    ///
    async fn save<O>(&self, key: &str, node: &O) -> Result<()>
    where
        O: Node + Sync,
    {
        let mut stream = self.mapper.store(key).await;
        stream.write_u16(MAGIC_NUMBER).await?;
        stream.write_u32(FORMAT_VERSION).await?;
        stream.write_byte(O::NODE_TYPE).await?;

        node.save_to(&mut stream).await?;

        Ok(stream.finish().await?)
    }

    /// Retrieve a node
    ///
    async fn retrieve<O>(&self, key: &str) -> Result<Option<O>>
    where
        O: Node,
    {
        match self.mapper.load(key).await? {
            None => Ok(None),
            Some(mut stream) => {
                let node_type = self.read_header(key, &mut stream).await?;
                if node_type != O::NODE_TYPE {
                    return Err(Error::Corrupt(format!(
                        "{key}: expecting node type {}, got {node_type}",
                        O::NODE_TYPE
                    )));
                }

                Ok(Some(O::load_from(&mut stream).await?))
            }
        }
    }

    async fn read_header(
        &self,
        key: &str,
        stream: &mut (impl AsyncRead + Unpin + Send),
    ) -> Result<u8> {
        let magic_number = stream.read_u16().await?;
        if magic_number != MAGIC_NUMBER {
            return Err(Error::Corrupt(format!("{key}: not a registry record")));
        }

        let version = stream.read_u32().await?;
        if version != FORMAT_VERSION {
            return Err(Error::Corrupt(format!(
                "{key}: unrecognized format version {version}"
            )));
        }

        Ok(stream.read_byte().await?)
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.map_locks.lock();
        let lock = locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())));

        Arc::clone(lock)
    }
}

fn map_key(map_type: MapType, id: &MapId) -> String {
    format!("map/{map_type}/{id}")
}

fn dataset_key(id: &DatasetId) -> String {
    format!("stds/{}/{id}", id.kind)
}
