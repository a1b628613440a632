use std::collections::BTreeSet;

use chrono::{Local, NaiveDateTime};
use tracing::debug;

use crate::{
    context::Context,
    errors::{Error, Result},
    map::{MapId, MapRecord, MapType},
    registry::Registry,
    store::DataStore,
    time::{Increment, TemporalExtent, TemporalType, TimeUnit},
};

/// Explicit times given for a batch of maps.
///
/// With an increment, map `i` of the batch starts at `start + i * increment` and, for intervals,
/// ends at `start + (i + 1) * increment`. Without one, every map gets the same stamp.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stamping {
    /// No explicit times, maps keep whatever stamp they already have
    Inherit,

    Absolute {
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        increment: Option<Increment>,
        interval: bool,
    },

    Relative {
        start: i64,
        end: Option<i64>,
        increment: Option<i64>,
        unit: TimeUnit,
        interval: bool,
    },
}

impl Stamping {
    pub fn temporal_type(&self) -> Option<TemporalType> {
        match self {
            Stamping::Inherit => None,
            Stamping::Absolute { .. } => Some(TemporalType::Absolute),
            Stamping::Relative { .. } => Some(TemporalType::Relative),
        }
    }

    /// The explicit stamp for the map at `index`, in the order the caller listed the maps
    ///
    pub fn stamp(&self, index: usize) -> Result<Option<TemporalExtent>> {
        let out_of_range =
            || Error::validation(format!("time stamp of map {} is out of range", index + 1));
        let index = i64::try_from(index).map_err(|_| out_of_range())?;
        let next = index.checked_add(1).ok_or_else(out_of_range)?;

        let extent = match self {
            Stamping::Inherit => return Ok(None),
            Stamping::Absolute {
                start,
                end,
                increment,
                interval,
            } => match increment {
                None => TemporalExtent::absolute(*start, *end)?,
                Some(increment) => {
                    let offset = |n: i64| {
                        increment
                            .times(n)
                            .and_then(|increment| increment.add_to(*start))
                            .ok_or_else(out_of_range)
                    };
                    let end = if *interval { Some(offset(next)?) } else { None };
                    TemporalExtent::absolute(offset(index)?, end)?
                }
            },
            Stamping::Relative {
                start,
                end,
                increment,
                unit,
                interval,
            } => match increment {
                None => TemporalExtent::relative(*start, *end, *unit)?,
                Some(increment) => {
                    let offset = |n: i64| {
                        increment
                            .checked_mul(n)
                            .and_then(|offset| start.checked_add(offset))
                            .ok_or_else(out_of_range)
                    };
                    let end = if *interval { Some(offset(next)?) } else { None };
                    TemporalExtent::relative(offset(index)?, end, *unit)?
                }
            },
        };

        Ok(Some(extent))
    }
}

/// Where a map's registered time stamp came from.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StampSource {
    /// Times given with the registration request
    Explicit,

    /// A time stamp attached to the map in the data store
    Attached,

    /// The stamp the map was already registered with
    Registered,

    /// No time stamp at all
    Unstamped,
}

/// The record a map is to be registered with.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub record: MapRecord,
    pub source: StampSource,

    /// The map was registered before with a different time stamp
    pub restamped: bool,
}

/// Works out the record a map should be registered with.
///
/// The time stamp comes from, in order of precedence: explicit times, a stamp attached to the map
/// in the data store, the map's existing registration. Provenance (`creator` and `ctime`) is never
/// changed for a map that is already registered. For a new map it is copied from the data store's
/// creation history, falling back to the current user and time only when there is no history.
///
pub struct StampResolver<'a> {
    registry: &'a Registry,
    store: &'a dyn DataStore,
}

impl<'a> StampResolver<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn DataStore) -> Self {
        Self { registry, store }
    }

    pub async fn resolve(
        &self,
        ctx: &Context,
        map_type: MapType,
        id: &MapId,
        explicit: Option<TemporalExtent>,
    ) -> Result<Resolution> {
        let existing = self.registry.find_map(map_type, id).await?;

        let (temporal, source) = match explicit {
            Some(explicit) => (Some(explicit), StampSource::Explicit),
            None => match self.store.timestamp(map_type, id).await? {
                Some(attached) => (Some(attached), StampSource::Attached),
                None => match existing.as_ref().and_then(|record| record.temporal.clone()) {
                    Some(registered) => (Some(registered), StampSource::Registered),
                    None => (None, StampSource::Unstamped),
                },
            },
        };

        let restamped = match &existing {
            Some(record) => record.temporal != temporal,
            None => false,
        };

        let (creator, ctime, datasets) = match existing {
            Some(record) => (record.creator, record.ctime, record.datasets),
            None => match self.store.creation_history(map_type, id).await? {
                Some(history) => (history.creator, history.ctime, BTreeSet::new()),
                None => {
                    debug!(map = %id, user = ctx.user(), "no creation history, using current user");
                    (ctx.user().to_string(), Local::now().naive_local(), BTreeSet::new())
                }
            },
        };

        debug!(map = %id, map_type = %map_type, source = ?source, "resolved time stamp");

        let record = MapRecord {
            id: id.clone(),
            map_type,
            temporal,
            creator,
            ctime,
            datasets,
        };

        Ok(Resolution {
            record,
            source,
            restamped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{self, datetime, MemoryDataStore};

    fn absolute(start: &str, increment: Option<&str>, interval: bool) -> Result<Stamping> {
        Ok(Stamping::Absolute {
            start: crate::time::parse_datetime(start).unwrap(),
            end: None,
            increment: increment.map(str::parse).transpose()?,
            interval,
        })
    }

    #[test]
    fn daily_intervals() -> Result<()> {
        let stamping = absolute("2001-01-01", Some("1 day"), true)?;
        for day in 0..5 {
            let stamp = stamping.stamp(day as usize)?.unwrap();
            assert_eq!(
                stamp.absolute_time(),
                Some((
                    datetime(2001, 1, 1 + day, 0, 0, 0),
                    Some(datetime(2001, 1, 2 + day, 0, 0, 0))
                ))
            );
        }

        Ok(())
    }

    #[test]
    fn contiguous_intervals() -> Result<()> {
        let stamping = absolute("2001-01-31", Some("1 month"), true)?;
        let stamps: Vec<(NaiveDateTime, Option<NaiveDateTime>)> = (0..13)
            .map(|i| stamping.stamp(i).map(|stamp| stamp.unwrap().absolute_time().unwrap()))
            .collect::<Result<_>>()?;
        for pair in stamps.windows(2) {
            assert_eq!(pair[0].1, Some(pair[1].0));
        }

        // Months are counted from the start, so the day of month is not lost after February
        assert_eq!(stamps[1].0, datetime(2001, 2, 28, 0, 0, 0));
        assert_eq!(stamps[2].0, datetime(2001, 3, 31, 0, 0, 0));
        assert_eq!(stamps[12].0, datetime(2002, 1, 31, 0, 0, 0));

        Ok(())
    }

    #[test]
    fn instants() -> Result<()> {
        let stamping = absolute("2001-01-01 10:30:01", Some("8 hours"), false)?;
        let expected = [
            datetime(2001, 1, 1, 10, 30, 1),
            datetime(2001, 1, 1, 18, 30, 1),
            datetime(2001, 1, 2, 2, 30, 1),
        ];
        for (i, start) in expected.into_iter().enumerate() {
            assert_eq!(
                stamping.stamp(i)?.unwrap().absolute_time(),
                Some((start, None))
            );
        }

        Ok(())
    }

    #[test]
    fn same_stamp_for_all() -> Result<()> {
        let stamping = Stamping::Absolute {
            start: datetime(2001, 1, 1, 0, 0, 0),
            end: Some(datetime(2001, 1, 3, 0, 0, 0)),
            increment: None,
            interval: false,
        };
        assert_eq!(stamping.stamp(0)?, stamping.stamp(7)?);
        assert!(stamping.stamp(0)?.unwrap().is_interval());

        let stamping = absolute("2001-01-01", None, false)?;
        assert_eq!(
            stamping.stamp(3)?.unwrap().absolute_time(),
            Some((datetime(2001, 1, 1, 0, 0, 0), None))
        );

        assert_eq!(Stamping::Inherit.stamp(0)?, None);

        Ok(())
    }

    #[test]
    fn relative() -> Result<()> {
        let stamping = Stamping::Relative {
            start: 0,
            end: None,
            increment: Some(1),
            unit: TimeUnit::Day,
            interval: true,
        };
        assert_eq!(
            stamping.stamp(0)?.unwrap().relative_time(),
            Some((0, Some(1), TimeUnit::Day))
        );
        assert_eq!(
            stamping.stamp(1)?.unwrap().relative_time(),
            Some((1, Some(2), TimeUnit::Day))
        );

        let stamping = Stamping::Relative {
            start: i64::MAX - 1,
            end: None,
            increment: Some(1),
            unit: TimeUnit::Second,
            interval: true,
        };
        assert!(matches!(stamping.stamp(1), Err(Error::Validation(_))));

        Ok(())
    }

    #[tokio::test]
    async fn explicit_overrides_attached() -> Result<()> {
        let registry = testing::registry();
        let store = MemoryDataStore::new().with_timestamp(
            MapType::Raster,
            "prec_1@PERMANENT",
            "1000000 seconds/1500000 seconds",
        );
        let ctx = Context::new("PERMANENT", "soeren");
        let resolver = StampResolver::new(&registry, &store);
        let id = MapId::new("prec_1", "PERMANENT");

        let explicit = TemporalExtent::absolute(datetime(2001, 1, 1, 0, 0, 0), None)?;
        let resolution = resolver
            .resolve(&ctx, MapType::Raster, &id, Some(explicit.clone()))
            .await?;
        assert_eq!(resolution.source, StampSource::Explicit);
        assert_eq!(resolution.record.temporal, Some(explicit));
        assert!(!resolution.restamped);

        let resolution = resolver.resolve(&ctx, MapType::Raster, &id, None).await?;
        assert_eq!(resolution.source, StampSource::Attached);
        assert_eq!(
            resolution.record.temporal.unwrap().relative_time(),
            Some((1000000, Some(1500000), TimeUnit::Second))
        );

        Ok(())
    }

    #[tokio::test]
    async fn registered_stamp_and_provenance_are_kept() -> Result<()> {
        let registry = testing::registry();
        let store = MemoryDataStore::new().with_history(
            MapType::Raster,
            "elevation@PERMANENT",
            "helena",
            datetime(2006, 11, 7, 1, 9, 51),
        );
        let ctx = Context::new("PERMANENT", "soeren");
        let resolver = StampResolver::new(&registry, &store);
        let id = MapId::new("elevation", "PERMANENT");

        let Resolution { record, source, .. } =
            resolver.resolve(&ctx, MapType::Raster, &id, None).await?;
        assert_eq!(source, StampSource::Unstamped);
        assert_eq!(record.temporal, None);
        assert_eq!(record.creator, "helena");
        assert_eq!(record.ctime, datetime(2006, 11, 7, 1, 9, 51));

        let stamped = MapRecord {
            temporal: Some(TemporalExtent::relative(5, None, TimeUnit::Day)?),
            creator: String::from("somebody"),
            ..record
        };
        registry.save_map(&stamped).await?;

        let resolution = resolver.resolve(&ctx, MapType::Raster, &id, None).await?;
        assert_eq!(resolution.source, StampSource::Registered);
        assert_eq!(resolution.record, stamped);
        assert!(!resolution.restamped);

        let explicit = TemporalExtent::relative(6, None, TimeUnit::Day)?;
        let resolution = resolver
            .resolve(&ctx, MapType::Raster, &id, Some(explicit))
            .await?;
        assert!(resolution.restamped);
        assert_eq!(resolution.record.creator, "somebody");

        Ok(())
    }

    #[tokio::test]
    async fn no_history() -> Result<()> {
        let registry = testing::registry();
        let store = MemoryDataStore::new().with_map(MapType::Vector, "lakes@PERMANENT");
        let ctx = Context::new("PERMANENT", "soeren");
        let resolver = StampResolver::new(&registry, &store);
        let id = MapId::new("lakes", "PERMANENT");

        let resolution = resolver.resolve(&ctx, MapType::Vector, &id, None).await?;
        assert_eq!(resolution.record.creator, "soeren");

        Ok(())
    }
}
