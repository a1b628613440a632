//! Registration of maps in the temporal database and in space time datasets.
//!
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use chrono::Local;
use futures::lock::Mutex as AsyncMutex;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    aggregate::{ExtentAggregator, MembershipUpdate},
    context::Context,
    dataset::{DatasetDefinition, DatasetId, DatasetType, SpaceTimeDataset},
    errors::{Error, Result},
    map::{split_name, MapId, MapRecord, MapType},
    registry::Registry,
    request::RegistrationRequest,
    stamp::{Resolution, StampResolver},
    store::DataStore,
};

/// Drives registration of maps in the temporal database and space time datasets.
///
/// Map records may be written by several callers at once. Updates to a single space time dataset
/// are serialized: a caller holds that dataset's lock from the moment it reads the dataset until
/// it has written it back. Updates to different datasets don't wait on each other.
///
pub struct Registrar {
    registry: Arc<Registry>,
    store: Arc<dyn DataStore>,

    /// One lock per dataset that has been updated through this `Registrar`
    locks: Mutex<HashMap<DatasetId, Arc<AsyncMutex<()>>>>,
}

impl Registrar {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn DataStore>) -> Self {
        Self {
            registry,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a batch of maps, and if a dataset is named, add them to it.
    ///
    /// The request is checked, every name resolved and every time stamp worked out before anything
    /// is written. A map that gets a new stamp must still fit every dataset it already belongs to.
    /// Map records are then written one at a time, in the order given, and the dataset is written
    /// once at the end. If something goes wrong part way through, map records already written stay
    /// written.
    ///
    /// Returns the identities of the registered maps, which excludes empty maps that were purged.
    ///
    pub async fn register(
        &self,
        ctx: &Context,
        request: &RegistrationRequest,
    ) -> Result<Vec<MapId>> {
        let planned = request.plan()?;
        let map_type = request.map_type;

        let dataset = match &request.dataset {
            Some(name) => {
                let id = ctx
                    .resolve_dataset(&self.registry, map_type.dataset_type(), name)
                    .await?;
                let dataset = self.registry.get_dataset(&id).await?;
                for map in &planned {
                    let found = match &map.explicit {
                        Some(explicit) => explicit.temporal_type(),
                        None => continue,
                    };
                    if found != dataset.temporal_type {
                        return Err(Error::InconsistentTemporalKind {
                            map: map.name.clone(),
                            dataset: id.to_string(),
                            expected: dataset.temporal_type,
                            found,
                        });
                    }
                }
                Some(id)
            }
            None => None,
        };

        let names: Vec<&str> = planned.iter().map(|map| map.name.as_str()).collect();
        let ids = self.resolve_maps(ctx, map_type, &names, false).await?;

        let resolver = StampResolver::new(&self.registry, self.store.as_ref());
        let mut resolutions = Vec::with_capacity(ids.len());
        for (map, id) in planned.into_iter().zip(&ids) {
            resolutions.push(resolver.resolve(ctx, map_type, id, map.explicit).await?);
        }
        self.check_restamped(&resolutions).await?;

        let mut restamped = BTreeSet::new();
        for resolution in resolutions {
            let id = resolution.record.id.clone();
            let temporal = resolution.record.temporal.clone();
            let record = resolution.record;

            // Membership may have changed since the record was read
            let written = self
                .registry
                .update_map(map_type, &id, |current| match current {
                    Some(mut current) => {
                        current.temporal = temporal;
                        Some(current)
                    }
                    None => Some(record),
                })
                .await?;
            if let (true, Some(written)) = (resolution.restamped, written) {
                restamped.extend(written.datasets);
            }
            info!(
                map = %id,
                map_type = %map_type,
                source = ?resolution.source,
                "registered map"
            );
        }

        let registered = match &dataset {
            Some(dataset) => {
                let update = self.add_to_dataset(dataset, &ids, request.delete_empty).await?;
                restamped.extend(update.affected);
                restamped.remove(dataset);
                update.registered
            }
            None => {
                if request.delete_empty {
                    debug!("no space time dataset given, empty maps are kept");
                }
                ids
            }
        };

        for other in &restamped {
            self.refresh_dataset(other).await?;
        }

        Ok(registered)
    }

    /// Add maps that are already registered to a space time dataset.
    ///
    pub async fn register_map_objects<S: AsRef<str>>(
        &self,
        ctx: &Context,
        map_type: MapType,
        dataset: &str,
        maps: &[S],
        delete_empty: bool,
    ) -> Result<Vec<MapId>> {
        let dataset = ctx
            .resolve_dataset(&self.registry, map_type.dataset_type(), dataset)
            .await?;
        let names: Vec<&str> = maps.iter().map(AsRef::as_ref).collect();
        let ids = self.resolve_maps(ctx, map_type, &names, true).await?;

        let update = self.add_to_dataset(&dataset, &ids, delete_empty).await?;
        for other in &update.affected {
            self.refresh_dataset(other).await?;
        }

        Ok(update.registered)
    }

    /// Unregister maps.
    ///
    /// With a dataset, the maps are only removed from that dataset. Without one, they are removed
    /// from every dataset they belong to and then from the temporal database. The maps themselves
    /// are left alone in the data store.
    ///
    pub async fn unregister<S: AsRef<str>>(
        &self,
        ctx: &Context,
        map_type: MapType,
        dataset: Option<&str>,
        maps: &[S],
    ) -> Result<Vec<MapId>> {
        let names: Vec<&str> = maps.iter().map(AsRef::as_ref).collect();
        let ids = self.resolve_maps(ctx, map_type, &names, true).await?;

        if let Some(dataset) = dataset {
            let dataset = ctx
                .resolve_dataset(&self.registry, map_type.dataset_type(), dataset)
                .await?;
            return self.remove_from_dataset(&dataset, &ids).await;
        }

        for id in &ids {
            let record = self
                .registry
                .take_map(map_type, id)
                .await?
                .ok_or_else(|| Error::not_found("map", id.to_string()))?;
            for dataset in &record.datasets {
                self.remove_from_dataset(dataset, std::slice::from_ref(id))
                    .await?;
            }
            info!(map = %id, map_type = %map_type, "unregistered map");
        }

        Ok(ids)
    }

    /// Create a new, empty space time dataset in the current mapset.
    ///
    /// An existing dataset with the same name is an error unless `overwrite` is set, in which
    /// case its members are released and it is replaced.
    ///
    pub async fn create_dataset(
        &self,
        ctx: &Context,
        mut definition: DatasetDefinition,
        overwrite: bool,
    ) -> Result<SpaceTimeDataset> {
        let (name, mapset) = split_name(&definition.name);
        if let Some(mapset) = mapset {
            if mapset != ctx.current_mapset() {
                return Err(Error::validation(format!(
                    "space time dataset <{}> can only be created in the current mapset <{}>",
                    definition.name,
                    ctx.current_mapset()
                )));
            }
        }
        definition.name = name.to_string();
        if definition.name.is_empty() {
            return Err(Error::validation("empty space time dataset name"));
        }

        let id = DatasetId::new(&definition.name, ctx.current_mapset(), definition.kind);
        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.registry.find_dataset(&id).await? {
            if !overwrite {
                return Err(Error::validation(format!(
                    "space time dataset <{id}> already exists"
                )));
            }
            warn!(dataset = %id, "overwriting space time dataset");
            self.release_members(&existing).await?;
        }

        let dataset = SpaceTimeDataset::new(
            definition,
            ctx.current_mapset(),
            ctx.user(),
            Local::now().naive_local(),
        );
        self.registry.save_dataset(&dataset).await?;
        info!(
            dataset = %id,
            kind = %id.kind,
            temporal_type = %dataset.temporal_type,
            "created dataset"
        );

        Ok(dataset)
    }

    /// Remove a space time dataset. Its member maps stay registered.
    ///
    pub async fn remove_dataset(
        &self,
        ctx: &Context,
        kind: DatasetType,
        name: &str,
    ) -> Result<()> {
        let id = ctx.resolve_dataset(&self.registry, kind, name).await?;
        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        let dataset = self.registry.get_dataset(&id).await?;
        self.release_members(&dataset).await?;
        self.registry.remove_dataset(&id).await?;
        info!(dataset = %id, kind = %id.kind, "removed dataset");

        Ok(())
    }

    /// Resolve map names, rejecting any map listed more than once.
    ///
    /// `registered` selects whether names are looked up in the temporal database or the data
    /// store.
    ///
    async fn resolve_maps(
        &self,
        ctx: &Context,
        map_type: MapType,
        names: &[&str],
        registered: bool,
    ) -> Result<Vec<MapId>> {
        let mut ids = Vec::with_capacity(names.len());
        let mut seen = HashSet::new();
        for name in names {
            let id = if registered {
                ctx.resolve_registered(&self.registry, map_type, name).await?
            } else {
                ctx.resolve_map(self.store.as_ref(), map_type, name).await?
            };
            if !seen.insert(id.clone()) {
                return Err(Error::validation(format!(
                    "map <{id}> is listed more than once"
                )));
            }
            ids.push(id);
        }

        Ok(ids)
    }

    async fn add_to_dataset(
        &self,
        id: &DatasetId,
        maps: &[MapId],
        delete_empty: bool,
    ) -> Result<MembershipUpdate> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut dataset = self.registry.get_dataset(id).await?;
        let aggregator = ExtentAggregator::new(&self.registry, self.store.as_ref());
        let update = aggregator.add_members(&mut dataset, maps, delete_empty).await?;
        self.registry.save_dataset(&dataset).await?;

        Ok(update)
    }

    async fn remove_from_dataset(&self, id: &DatasetId, maps: &[MapId]) -> Result<Vec<MapId>> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut dataset = match self.registry.find_dataset(id).await? {
            Some(dataset) => dataset,
            None => {
                warn!(dataset = %id, "space time dataset no longer exists");
                return Ok(vec![]);
            }
        };
        let aggregator = ExtentAggregator::new(&self.registry, self.store.as_ref());
        let removed = aggregator.remove_members(&mut dataset, maps).await?;
        self.registry.save_dataset(&dataset).await?;

        Ok(removed)
    }

    /// Recompute a dataset's extent and granularity after some of its members changed.
    ///
    async fn refresh_dataset(&self, id: &DatasetId) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        if let Some(mut dataset) = self.registry.find_dataset(id).await? {
            let aggregator = ExtentAggregator::new(&self.registry, self.store.as_ref());
            aggregator.refresh(&mut dataset).await?;
            self.registry.save_dataset(&dataset).await?;
            debug!(dataset = %id, "refreshed dataset");
        }

        Ok(())
    }

    /// Make sure maps about to be restamped still fit every dataset they belong to.
    ///
    async fn check_restamped(&self, resolutions: &[Resolution]) -> Result<()> {
        let restamped: Vec<MapRecord> = resolutions
            .iter()
            .filter(|resolution| resolution.restamped)
            .map(|resolution| resolution.record.clone())
            .collect();
        let datasets: BTreeSet<&DatasetId> = restamped
            .iter()
            .flat_map(|record| record.datasets.iter())
            .collect();

        let aggregator = ExtentAggregator::new(&self.registry, self.store.as_ref());
        for id in datasets {
            if let Some(dataset) = self.registry.find_dataset(id).await? {
                aggregator.check_restamped(&dataset, &restamped).await?;
            }
        }

        Ok(())
    }

    /// Remove a dataset from the records of all of its members. The caller holds the dataset's
    /// lock.
    async fn release_members(&self, dataset: &SpaceTimeDataset) -> Result<()> {
        let map_type = dataset.map_type();
        for id in &dataset.members {
            self.registry
                .update_map(map_type, id, |current| {
                    let mut current = current?;
                    current.datasets.remove(&dataset.id).then_some(current)
                })
                .await?;
        }

        Ok(())
    }

    fn lock_for(&self, id: &DatasetId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        let lock = locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())));

        Arc::clone(lock)
    }
}
