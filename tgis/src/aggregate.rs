use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::{
    dataset::{DatasetExtent, DatasetId, SpaceTimeDataset},
    errors::{Error, Result},
    filter::{Decision, EmptyMapFilter},
    granularity::{absolute_granularity, relative_granularity, Granularity},
    map::{MapId, MapRecord},
    registry::Registry,
    store::DataStore,
    time::{TemporalExtent, TemporalType, TimeUnit},
};

/// The outcome of adding maps to a space time dataset.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipUpdate {
    /// Maps that are now members, in the order they were given
    pub registered: Vec<MapId>,

    /// Empty maps that were removed instead
    pub purged: Vec<MapId>,

    /// Other datasets that had purged maps as members
    pub affected: BTreeSet<DatasetId>,
}

/// Maintains space time dataset membership along with the extent and granularity derived from it.
///
/// Changes to a dataset are made to the `SpaceTimeDataset` passed in. Saving the dataset is left
/// to the caller, so it is written once no matter how many maps change. Member map records are
/// written here, after every map involved has been checked.
///
pub struct ExtentAggregator<'a> {
    registry: &'a Registry,
    store: &'a dyn DataStore,
}

impl<'a> ExtentAggregator<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn DataStore) -> Self {
        Self { registry, store }
    }

    /// Add registered maps to a dataset.
    ///
    /// When `delete_empty` is set, maps the data store reports as empty are purged from the
    /// temporal database and the data store rather than added. All other maps must carry a time
    /// stamp of the dataset's temporal type, and for relative time, the dataset's unit. Nothing is
    /// written unless every map passes.
    ///
    pub async fn add_members(
        &self,
        dataset: &mut SpaceTimeDataset,
        maps: &[MapId],
        delete_empty: bool,
    ) -> Result<MembershipUpdate> {
        let map_type = dataset.map_type();
        let filter = EmptyMapFilter::new(self.store);

        let mut update = MembershipUpdate::default();
        let mut joining = vec![];
        for id in maps {
            match filter.decide(map_type, id, delete_empty).await? {
                Decision::Purge => update.purged.push(id.clone()),
                Decision::Register => joining.push(self.registry.get_map(map_type, id).await?),
            }
        }

        let leaving: BTreeSet<&MapId> = maps.iter().collect();
        let mut records = self.load_members(dataset, &leaving).await?;
        records.extend(joining.iter().cloned());
        check_members(dataset, &records)?;
        let (extent, granularity) = summarize(dataset.temporal_type, &records)?;

        for id in &update.purged {
            if let Some(record) = self.registry.take_map(map_type, id).await? {
                update.affected.extend(
                    record
                        .datasets
                        .into_iter()
                        .filter(|other| *other != dataset.id),
                );
            }
            self.store.remove(map_type, id).await?;
            dataset.members.remove(id);
            warn!(map = %id, dataset = %dataset.id, "purged empty map");
        }

        for record in joining {
            let member_of = dataset.id.clone();
            self.registry
                .update_map(map_type, &record.id, |current| {
                    let mut current = current?;
                    current.datasets.insert(member_of).then_some(current)
                })
                .await?;
            dataset.members.insert(record.id.clone());
            update.registered.push(record.id);
        }

        dataset.extent = extent;
        dataset.granularity = granularity;
        info!(
            dataset = %dataset.id,
            registered = update.registered.len(),
            purged = update.purged.len(),
            members = dataset.members.len(),
            "updated dataset membership"
        );

        Ok(update)
    }

    /// Remove maps from a dataset. Returns the maps that actually were members.
    ///
    pub async fn remove_members(
        &self,
        dataset: &mut SpaceTimeDataset,
        maps: &[MapId],
    ) -> Result<Vec<MapId>> {
        let map_type = dataset.map_type();
        let mut removed = vec![];
        for id in maps {
            if dataset.members.remove(id) {
                removed.push(id.clone());
            }
        }

        let records = self.load_members(dataset, &BTreeSet::new()).await?;
        check_members(dataset, &records)?;
        let (extent, granularity) = summarize(dataset.temporal_type, &records)?;

        for id in &removed {
            let member_of = dataset.id.clone();
            self.registry
                .update_map(map_type, id, |current| {
                    let mut current = current?;
                    current.datasets.remove(&member_of).then_some(current)
                })
                .await?;
        }

        dataset.extent = extent;
        dataset.granularity = granularity;
        info!(
            dataset = %dataset.id,
            removed = removed.len(),
            members = dataset.members.len(),
            "removed maps from dataset"
        );

        Ok(removed)
    }

    /// Recompute extent and granularity from the current member records.
    ///
    pub async fn refresh(&self, dataset: &mut SpaceTimeDataset) -> Result<()> {
        let records = self.load_members(dataset, &BTreeSet::new()).await?;
        check_members(dataset, &records)?;
        let (extent, granularity) = summarize(dataset.temporal_type, &records)?;
        dataset.extent = extent;
        dataset.granularity = granularity;

        Ok(())
    }

    /// Check that a dataset would stay consistent if the members among `restamped` took on the
    /// stamps given there. Nothing is written.
    ///
    pub async fn check_restamped(
        &self,
        dataset: &SpaceTimeDataset,
        restamped: &[MapRecord],
    ) -> Result<()> {
        let map_type = dataset.map_type();
        let mut records = vec![];
        for id in &dataset.members {
            match restamped.iter().find(|record| record.id == *id) {
                Some(record) => records.push(record.clone()),
                None => records.extend(self.registry.find_map(map_type, id).await?),
            }
        }

        check_members(dataset, &records)?;
        summarize(dataset.temporal_type, &records)?;

        Ok(())
    }

    /// Read the records of current members, except those in `skip`. Members that are no longer
    /// registered are dropped from the dataset.
    ///
    async fn load_members(
        &self,
        dataset: &mut SpaceTimeDataset,
        skip: &BTreeSet<&MapId>,
    ) -> Result<Vec<MapRecord>> {
        let map_type = dataset.map_type();
        let mut records = vec![];
        let mut vanished = vec![];
        for id in &dataset.members {
            if skip.contains(id) {
                continue;
            }
            match self.registry.find_map(map_type, id).await? {
                Some(record) => records.push(record),
                None => vanished.push(id.clone()),
            }
        }

        for id in vanished {
            warn!(map = %id, dataset = %dataset.id, "member is no longer registered, dropping it");
            dataset.members.remove(&id);
        }

        Ok(records)
    }
}

/// Every member needs a stamp of the dataset's temporal type. Relative members must all use the
/// same unit.
///
fn check_members(dataset: &SpaceTimeDataset, records: &[MapRecord]) -> Result<()> {
    let mut unit: Option<TimeUnit> = None;
    for record in records {
        let temporal = record.temporal.as_ref().ok_or_else(|| Error::MissingTimestamp {
            map: record.id.to_string(),
        })?;

        let found = temporal.temporal_type();
        if found != dataset.temporal_type {
            return Err(Error::InconsistentTemporalKind {
                map: record.id.to_string(),
                dataset: dataset.id.to_string(),
                expected: dataset.temporal_type,
                found,
            });
        }

        if let Some(found) = temporal.unit() {
            match unit {
                None => unit = Some(found),
                Some(expected) if expected != found => {
                    return Err(Error::InconsistentUnit {
                        map: record.id.to_string(),
                        dataset: dataset.id.to_string(),
                        expected,
                        found,
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}

/// Extent and granularity of a set of member records that have already passed `check_members`.
///
/// The extent runs from the earliest start to the latest end, where an instantaneous map ends
/// where it starts.
///
/// Relative offsets so far apart that no granularity fits an `i64` are a validation error.
///
pub fn summarize(
    temporal_type: TemporalType,
    records: &[MapRecord],
) -> Result<(Option<DatasetExtent>, Option<Granularity>)> {
    let temporal = records.iter().filter_map(|record| record.temporal.as_ref());
    match temporal_type {
        TemporalType::Absolute => {
            let stamps: Vec<(NaiveDateTime, Option<NaiveDateTime>)> =
                temporal.filter_map(TemporalExtent::absolute_time).collect();
            let start = stamps.iter().map(|(start, _)| *start).min();
            let end = stamps.iter().map(|(start, end)| end.unwrap_or(*start)).max();
            let extent = start
                .zip(end)
                .map(|(start, end)| DatasetExtent::Absolute { start, end });

            Ok((extent, absolute_granularity(&stamps)))
        }
        TemporalType::Relative => {
            let stamps: Vec<(i64, Option<i64>, TimeUnit)> =
                temporal.filter_map(TemporalExtent::relative_time).collect();
            let unit = match stamps.first() {
                Some((_, _, unit)) => *unit,
                None => return Ok((None, None)),
            };
            let stamps: Vec<(i64, Option<i64>)> =
                stamps.into_iter().map(|(start, end, _)| (start, end)).collect();
            let start = stamps.iter().map(|(start, _)| *start).min();
            let end = stamps.iter().map(|(start, end)| end.unwrap_or(*start)).max();
            let extent = start
                .zip(end)
                .map(|(start, end)| DatasetExtent::Relative { start, end, unit });

            Ok((extent, relative_granularity(&stamps, unit)?))
        }
    }
}
