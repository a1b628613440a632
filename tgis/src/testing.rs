use std::{
    collections::HashMap,
    io::{self, Write},
    mem,
    pin::Pin,
    result,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::{
    io::{AsyncRead, AsyncWrite, Cursor, Error as AioError},
    task::{Context, Poll},
};
use parking_lot::Mutex;

use crate::{
    errors::{Error, Result},
    map::{MapId, MapType},
    mapper::{Mapper, StoreWrite},
    registry::Registry,
    store::{DataStore, History},
    time::TemporalExtent,
    timestamp::parse_timestamp,
};

pub(crate) type AioResult<T> = result::Result<T, AioError>;

pub(crate) fn datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .expect("valid date and time")
}

/// A test implementation of Mapper that stores objects in RAM
///
pub(crate) struct MemoryMapper {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMapper {
    pub(crate) fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Put raw bytes into the store, bypassing the registry
    pub(crate) fn insert(&self, key: &str, object: Vec<u8>) {
        self.objects.lock().insert(key.to_string(), object);
    }
}

#[async_trait]
impl Mapper for MemoryMapper {
    async fn store(&self, key: &str) -> Box<dyn StoreWrite + '_> {
        Box::new(MemoryMapperStoreWrite::new(self, key))
    }

    async fn load(&self, key: &str) -> io::Result<Option<Box<dyn AsyncRead + Unpin + Send + '_>>> {
        let objects = self.objects.lock();
        match objects.get(key) {
            Some(object) => Ok(Some(Box::new(Cursor::new(object.clone())))),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> io::Result<bool> {
        Ok(self.objects.lock().remove(key).is_some())
    }
}

struct MemoryMapperStoreWrite<'a> {
    mapper: &'a MemoryMapper,
    key: String,
    buffer: Vec<u8>,
}

impl<'a> MemoryMapperStoreWrite<'a> {
    fn new(mapper: &'a MemoryMapper, key: &str) -> Self {
        Self {
            mapper,
            key: key.to_string(),
            buffer: Vec::new(),
        }
    }
}

impl<'a> AsyncWrite for MemoryMapperStoreWrite<'a> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<AioResult<usize>> {
        Poll::Ready(self.buffer.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<AioResult<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<AioResult<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl<'a> StoreWrite for MemoryMapperStoreWrite<'a> {
    async fn finish(mut self: Box<Self>) -> io::Result<()> {
        let object = mem::take(&mut self.buffer);
        self.mapper.objects.lock().insert(self.key.clone(), object);

        Ok(())
    }
}

pub(crate) fn registry() -> Arc<Registry> {
    Arc::new(Registry::new(Box::new(MemoryMapper::new())))
}

#[derive(Clone, Default)]
struct StoredMap {
    timestamp: Option<TemporalExtent>,
    history: Option<History>,
    empty: bool,
}

/// A test implementation of DataStore that keeps map metadata in RAM
///
pub(crate) struct MemoryDataStore {
    maps: Mutex<HashMap<(MapType, MapId), StoredMap>>,
    removed: Mutex<Vec<(MapType, MapId)>>,

    /// Hand control back to the runtime at the start of every call
    yielding: bool,
}

impl MemoryDataStore {
    pub(crate) fn new() -> Self {
        Self {
            maps: Mutex::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
            yielding: false,
        }
    }

    /// Yield to other tasks on every call, so concurrent callers interleave
    pub(crate) fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    async fn pause(&self) {
        if self.yielding {
            tokio::task::yield_now().await;
        }
    }

    fn update(&self, map_type: MapType, name: &str, update: impl FnOnce(&mut StoredMap)) {
        let id: MapId = name.parse().expect("fully qualified map name");
        let mut maps = self.maps.lock();
        update(maps.entry((map_type, id)).or_default());
    }

    /// Add a map with no metadata
    pub(crate) fn with_map(self, map_type: MapType, name: &str) -> Self {
        self.update(map_type, name, |_| {});
        self
    }

    /// Add a map with a time stamp attached, given in the textual time stamp format
    pub(crate) fn with_timestamp(self, map_type: MapType, name: &str, timestamp: &str) -> Self {
        self.set_timestamp(map_type, name, timestamp);
        self
    }

    pub(crate) fn with_history(
        self,
        map_type: MapType,
        name: &str,
        creator: &str,
        ctime: NaiveDateTime,
    ) -> Self {
        let history = History {
            creator: creator.to_string(),
            ctime,
        };
        self.update(map_type, name, |map| map.history = Some(history));
        self
    }

    /// Add a map that holds no data
    pub(crate) fn with_empty(self, map_type: MapType, name: &str) -> Self {
        self.update(map_type, name, |map| map.empty = true);
        self
    }

    pub(crate) fn set_timestamp(&self, map_type: MapType, name: &str, timestamp: &str) {
        let timestamp = parse_timestamp(timestamp).expect("valid time stamp");
        self.update(map_type, name, |map| map.timestamp = Some(timestamp));
    }

    pub(crate) fn was_removed(&self, map_type: MapType, name: &str) -> bool {
        let id: MapId = name.parse().expect("fully qualified map name");
        self.removed.lock().contains(&(map_type, id))
    }

    fn get(&self, map_type: MapType, id: &MapId) -> Option<StoredMap> {
        self.maps.lock().get(&(map_type, id.clone())).cloned()
    }

    fn lookup(&self, map_type: MapType, id: &MapId) -> Result<StoredMap> {
        self.get(map_type, id)
            .ok_or_else(|| Error::not_found("map", id.to_string()))
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn exists(&self, map_type: MapType, id: &MapId) -> Result<bool> {
        self.pause().await;
        Ok(self.get(map_type, id).is_some())
    }

    async fn creation_history(&self, map_type: MapType, id: &MapId) -> Result<Option<History>> {
        self.pause().await;
        Ok(self.lookup(map_type, id)?.history)
    }

    async fn timestamp(&self, map_type: MapType, id: &MapId) -> Result<Option<TemporalExtent>> {
        self.pause().await;
        Ok(self.lookup(map_type, id)?.timestamp)
    }

    async fn is_empty(&self, map_type: MapType, id: &MapId) -> Result<bool> {
        self.pause().await;
        Ok(self.lookup(map_type, id)?.empty)
    }

    async fn remove(&self, map_type: MapType, id: &MapId) -> Result<()> {
        self.pause().await;
        self.lookup(map_type, id)?;
        self.maps.lock().remove(&(map_type, id.clone()));
        self.removed.lock().push((map_type, id.clone()));

        Ok(())
    }
}
